use clap::Parser;
use core::time::Duration;
use futures::StreamExt;
use tidings_client::StreamClient;
use tidings_core::{
    Secret,
    token::TokenCodec,
    types::{DEFAULT_ENDPOINT, DEFAULT_TOKEN_TTL},
};
use tracing_subscriber::EnvFilter;

/// Streams greetings for one or more users and prints them as they arrive.
#[derive(Parser, Debug)]
#[command(name = "tidings-client", version)]
struct Args {
    /// Server endpoint.
    ///
    /// Environment variable: `SERVER_ENDPOINT`
    #[arg(long, env = "SERVER_ENDPOINT", default_value_t = String::from(DEFAULT_ENDPOINT))]
    endpoint: String,

    /// Comma-separated users to stream for, one call after the other.
    #[arg(long, value_delimiter = ',', default_value = "User1")]
    users: Vec<String>,

    /// Shared secret used to mint a token per user. Without it no credential
    /// is sent.
    ///
    /// Environment variable: `AUTH_SECRET`
    #[arg(long, env = "AUTH_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Lifetime of minted tokens, in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL.as_secs())]
    token_ttl: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let codec = args.secret.map(|s| TokenCodec::new(&Secret::new(s)));
    let ttl = Duration::from_secs(args.token_ttl);
    let mut client = StreamClient::connect(args.endpoint).await?;

    for (i, user) in args.users.iter().enumerate() {
        if i > 0 {
            println!("{}", "-".repeat(40));
        }

        let token = codec.as_ref().map(|c| c.encode(user, ttl)).transpose()?;
        stream_for(&mut client, user, token.as_deref()).await;
    }

    Ok(())
}

/// Prints every message of one call. Failures are reported, not propagated,
/// so the remaining users still get their turn.
async fn stream_for(client: &mut StreamClient, user: &str, token: Option<&str>) {
    println!("Streaming data for {user}:");

    let mut stream = match client.call(user, token).await {
        Ok(stream) => stream,
        Err(e) => {
            println!("Error: {e}");
            return;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => println!("{message}"),
            Err(e) => {
                tracing::debug!(user, "Stream aborted: {e:?}");
                println!("Error: {e}");
                break;
            }
        }
    }
}
