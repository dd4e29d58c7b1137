use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::sync::Arc;
use tidings_core::{
    Secret,
    types::{DEFAULT_MESSAGES_PER_STREAM, DEFAULT_PACING, DEFAULT_SERVER_ADDR},
};

/// Runtime configuration for the `tidings-server` binary.
///
/// Every value can come from a CLI flag or from the environment (a `.env`
/// file is loaded first). Defaults reproduce the classic demo: five messages,
/// one second apart, ten concurrent calls, no authentication.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tidings-server",
    version,
    about = "A gRPC service streaming paced greetings per user"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/tidings.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from(DEFAULT_SERVER_ADDR))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Maximum number of calls streaming at the same time.
    ///
    /// Calls beyond this bound wait for a slot to free up.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Number of messages emitted per call.
    ///
    /// Environment variable: `MESSAGES_PER_STREAM`
    #[arg(long, env = "MESSAGES_PER_STREAM", default_value_t = DEFAULT_MESSAGES_PER_STREAM)]
    pub messages_per_stream: usize,

    /// Delay between consecutive messages, in milliseconds.
    ///
    /// Environment variable: `PACING_MS`
    #[arg(long, env = "PACING_MS", default_value_t = DEFAULT_PACING.as_millis() as u64)]
    pub pacing_ms: u64,

    /// Capacity of the buffer between an emitting task and the gRPC stream.
    ///
    /// The default of 1 keeps the producer at most one message ahead of the
    /// client, which is what makes client cancellation prompt.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 1)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight calls to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Shared HS256 secret. When set, every call must carry a valid token in
    /// the `authorization` metadata key.
    ///
    /// Environment variable: `AUTH_SECRET`
    #[arg(long, env = "AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub num_workers: usize,
    pub messages_per_stream: usize,
    pub pacing: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub auth_secret: Option<Arc<Secret<String>>>,
}

impl ServerConfig {
    /// Whether calls must be authenticated.
    pub fn is_secure(&self) -> bool {
        self.auth_secret.is_some()
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.messages_per_stream == 0 {
            bail!("MESSAGES_PER_STREAM must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        let auth_secret = match args.auth_secret {
            Some(secret) if secret.is_empty() => bail!("AUTH_SECRET must not be empty"),
            Some(secret) => Some(Arc::new(Secret::new(secret))),
            None => None,
        };

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            num_workers: args.num_workers,
            messages_per_stream: args.messages_per_stream,
            pacing: Duration::from_millis(args.pacing_ms),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            auth_secret,
        })
    }
}
