use core::{fmt, hint::black_box, time::Duration};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::stream::FuturesUnordered;
use std::{net::SocketAddr, time::Instant};
use tidings_core::proto::{StreamRequest, streaming_service_client::StreamingServiceClient};
use tidings_server::{ServerConfig, serve_with_incoming};
use tokio::{net::TcpListener, runtime::Builder, sync::oneshot};
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tonic::{codec::CompressionEncoding, transport::Channel};

#[derive(Clone, Copy, Debug)]
enum Compression {
    None,
    Deflate,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Deflate => Some(CompressionEncoding::Deflate),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct StreamBenchParams {
    concurrency: usize,
    compression: Compression,
}

/// Unpaced server so the numbers measure call overhead, not the timer.
fn bench_config(messages_per_stream: usize) -> ServerConfig {
    ServerConfig {
        server_addr: String::from("127.0.0.1:0"),
        uds: false,
        num_workers: 128,
        messages_per_stream,
        pacing: Duration::ZERO,
        stream_buffer_size: 64,
        shutdown_timeout: Duration::from_secs(1),
        auth_secret: None,
    }
}

fn stream_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    let messages_cases = [5, 100, 1_000];
    let concurrency_cases = [1, 8, 32, 128];
    let compression_cases = [
        Compression::None,
        Compression::Zstd,
        Compression::Gzip,
        Compression::Deflate,
    ];

    for &messages_per_stream in &messages_cases {
        let (addr, stop) = rt.block_on(start_server(bench_config(messages_per_stream)));

        for &concurrency in &concurrency_cases {
            for &compression in &compression_cases {
                let params = StreamBenchParams {
                    concurrency,
                    compression,
                };

                let mut group = c.benchmark_group("grpc/stream_data");
                group.throughput(Throughput::Elements(
                    (messages_per_stream * concurrency) as u64,
                ));

                group.bench_function(
                    format!("msgs/{messages_per_stream}/conc/{concurrency}/comp/{compression}"),
                    |b| {
                        b.to_async(&rt).iter_custom(|iters| async move {
                            let channel = Channel::from_shared(format!("http://{addr}"))
                                .expect("Invalid URI")
                                .connect()
                                .await
                                .expect("Failed to connect to server");

                            let start = Instant::now();
                            for _ in 0..iters {
                                run_stream_bench(&channel, params, messages_per_stream).await;
                            }
                            start.elapsed()
                        });
                    },
                );

                group.finish();
            }
        }

        let _ = stop.send(());
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind(&config.server_addr)
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("missing local addr");
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(serve_with_incoming(
        config,
        TcpListenerStream::new(listener),
        async {
            let _ = rx.await;
        },
    ));

    (addr, tx)
}

async fn run_stream_bench(channel: &Channel, params: StreamBenchParams, expected: usize) {
    let mut tasks = FuturesUnordered::new();

    for i in 0..params.concurrency {
        let channel = channel.clone();

        tasks.push(tokio::spawn(async move {
            let mut client = StreamingServiceClient::new(channel);
            if let Some(encoding) = params.compression.into() {
                client = client.accept_compressed(encoding).send_compressed(encoding)
            }

            let mut stream = client
                .stream_data(StreamRequest {
                    user_id: format!("User{i}"),
                })
                .await
                .expect("stream call failed")
                .into_inner();

            let mut received = 0;
            while let Some(resp) = stream.next().await {
                black_box(resp.expect("resp").message);
                received += 1;
            }
            assert_eq!(received, expected, "Stream ended early");
        }));
    }

    while let Some(res) = tasks.next().await {
        res.unwrap();
    }
}

criterion_group!(grpc_benches, stream_bench);
criterion_main!(grpc_benches);
