//! Server-side components of the `tidings` streaming service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`pool`] - the bounded pool of call tasks and its shutdown sequence.
//! - [`service`] - the gRPC handler and the authentication interceptor.
//! - [`streaming`] - message production and the per-call emission loop.
//! - [`telemetry`] - logging setup and optional OpenTelemetry export.
//!
//! [`serve_with_incoming`] wires them together into a running server.

pub mod config;
pub mod pool;
pub mod service;
pub mod streaming;
pub mod telemetry;

use config::ServerConfig;
use core::future::Future;
use futures::Stream;
use service::{auth::Authenticator, handler::StreamService};
use tidings_core::{
    proto::{FILE_DESCRIPTOR_SET, streaming_service_server::StreamingServiceServer},
    token::TokenCodec,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::{
    codec::CompressionEncoding,
    service::interceptor::InterceptedService,
    transport::{Server, server::Connected},
};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Serves the streaming service on `incoming` until `signal` resolves.
///
/// Besides `tidings.StreamingService`, the server exposes gRPC health and
/// reflection, and accepts grpc-web callers. Once `signal` resolves the
/// health status flips to `NOT_SERVING`, the worker pool stops admitting
/// calls and drains, and then the transport shuts down.
pub async fn serve_with_incoming<I, IO, IE, F>(
    config: ServerConfig,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<StreamingServiceServer<StreamService>>()
        .await;

    let service = StreamService::new(config.clone());
    let authenticator = match &config.auth_secret {
        Some(secret) => Authenticator::token(TokenCodec::new(secret)),
        None => Authenticator::Disabled,
    };

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let shutdown = {
        let service = service.clone();
        async move {
            signal.await;
            tracing::info!("Shutdown signal received, terminating gracefully...");

            // 1. Publish the status
            health_reporter
                .set_not_serving::<StreamingServiceServer<StreamService>>()
                .await;

            // 2. Drain the worker pool
            if let Err(e) = service.shutdown().await {
                tracing::error!("Error during service shutdown: {e:?}");
            }
        }
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(InterceptedService::new(
            build_stream_service(service),
            authenticator,
        ))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn build_stream_service(service: StreamService) -> StreamingServiceServer<StreamService> {
    StreamingServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
