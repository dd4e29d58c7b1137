use core::time::Duration;
use futures::StreamExt;
use std::{net::SocketAddr, sync::Arc};
use tidings_client::{MessageStream, StreamClient};
use tidings_core::{
    Error, Secret,
    token::{TokenCodec, unix_now},
};
use tidings_server::{ServerConfig, serve_with_incoming};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::Code;

const SECRET: &str = "my_secret_key";

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    /// Binds an ephemeral port before spawning, so clients can connect
    /// immediately.
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(serve_with_incoming(
            config,
            TcpListenerStream::new(listener),
            async {
                let _ = rx.await;
            },
        ));

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn client(&self) -> StreamClient {
        StreamClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    async fn stop(mut self) {
        self.trigger_shutdown();
        timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

fn config(secret: Option<&str>) -> ServerConfig {
    ServerConfig {
        server_addr: String::from("127.0.0.1:0"),
        uds: false,
        num_workers: 4,
        messages_per_stream: 5,
        pacing: Duration::from_millis(20),
        stream_buffer_size: 1,
        shutdown_timeout: Duration::from_secs(2),
        auth_secret: secret.map(|s| Arc::new(Secret::new(s.to_owned()))),
    }
}

fn codec(secret: &str) -> TokenCodec {
    TokenCodec::new(&Secret::new(secret.to_owned()))
}

fn token_for(user_id: &str) -> String {
    codec(SECRET)
        .encode(user_id, Duration::from_secs(60))
        .unwrap()
}

fn expected(user_id: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("Hello {user_id}, this is message {i}"))
        .collect()
}

async fn collect(stream: MessageStream) -> Vec<String> {
    stream.map(|item| item.unwrap()).collect().await
}

fn assert_rejected(res: Result<MessageStream, Error>, code: Code, details: &str) {
    match res {
        Err(Error::Rpc { code: c, details: d }) => {
            assert_eq!(c, code);
            assert_eq!(d, details);
        }
        Err(e) => panic!("unexpected error: {e:?}"),
        Ok(_) => panic!("call was not rejected"),
    }
}

#[tokio::test]
async fn authenticated_call_streams_five_ordered_messages() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let stream = client.call("Alice", Some(&token_for("Alice"))).await.unwrap();
    assert_eq!(collect(stream).await, expected("Alice", 5));

    server.stop().await;
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let res = client.call("Alice", None).await;
    assert_rejected(res, Code::Unauthenticated, "Authorization token is missing");

    server.stop().await;
}

#[tokio::test]
async fn expired_token_is_unauthenticated() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let token = codec(SECRET).encode_until("Alice", unix_now() - 5).unwrap();

    let res = client.call("Alice", Some(&token)).await;
    assert_rejected(res, Code::Unauthenticated, "Authorization token has expired");

    server.stop().await;
}

#[tokio::test]
async fn token_signed_with_another_secret_is_unauthenticated() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let token = codec("wrong_secret")
        .encode("Alice", Duration::from_secs(60))
        .unwrap();

    let res = client.call("Alice", Some(&token)).await;
    assert_rejected(res, Code::Unauthenticated, "Invalid authorization token");

    server.stop().await;
}

#[tokio::test]
async fn token_without_user_id_is_unauthenticated() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let token = codec(SECRET).encode("", Duration::from_secs(60)).unwrap();

    let res = client.call("Alice", Some(&token)).await;
    assert_rejected(res, Code::Unauthenticated, "Invalid token payload");

    server.stop().await;
}

#[tokio::test]
async fn token_identity_overrides_the_request_body() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let mut client = server.client().await;

    let stream = client
        .call("Mallory", Some(&token_for("Alice")))
        .await
        .unwrap();
    assert_eq!(collect(stream).await, expected("Alice", 5));

    server.stop().await;
}

#[tokio::test]
async fn unauthenticated_server_streams_for_the_body_user() {
    let server = TestServer::start(config(None)).await;
    let mut client = server.client().await;

    let stream = client.call("User1", None).await.unwrap();
    assert_eq!(collect(stream).await, expected("User1", 5));

    server.stop().await;
}

#[tokio::test]
async fn concurrent_users_receive_their_own_sequences() {
    let server = TestServer::start(config(Some(SECRET))).await;
    let client = server.client().await;

    let run = |user: &'static str| {
        let mut client = client.clone();
        async move {
            let stream = client.call(user, Some(&token_for(user))).await.unwrap();
            collect(stream).await
        }
    };

    let (alice, bob) = tokio::join!(run("Alice"), run("Bob"));
    assert_eq!(alice, expected("Alice", 5));
    assert_eq!(bob, expected("Bob", 5));

    server.stop().await;
}

#[tokio::test]
async fn dropping_a_stream_frees_its_worker_slot() {
    let server = TestServer::start(ServerConfig {
        num_workers: 1,
        pacing: Duration::from_millis(200),
        ..config(None)
    })
    .await;
    let mut client = server.client().await;

    let mut first = client.call("Alice", None).await.unwrap();
    let message = first.next().await.unwrap().unwrap();
    assert_eq!(message, "Hello Alice, this is message 1");
    drop(first);

    // With a single slot this only starts once the first call let go.
    let second = timeout(Duration::from_secs(5), async {
        let stream = client.call("Bob", None).await.unwrap();
        collect(stream).await
    })
    .await
    .expect("slot was never released");
    assert_eq!(second, expected("Bob", 5));

    server.stop().await;
}

#[tokio::test]
async fn shutdown_refuses_new_calls_and_drains_in_flight_ones() {
    let mut server = TestServer::start(ServerConfig {
        pacing: Duration::from_millis(100),
        ..config(None)
    })
    .await;
    let mut client = server.client().await;

    let mut in_flight = client.call("Alice", None).await.unwrap();
    let mut received = vec![in_flight.next().await.unwrap().unwrap()];

    server.trigger_shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client.call("Bob", None).await;
    assert_rejected(res, Code::Unavailable, "Service is shutting down");

    received.extend(collect(in_flight).await);
    assert_eq!(received, expected("Alice", 5));

    server.stop().await;
}
