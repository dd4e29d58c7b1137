//! gRPC service implementation for paced greeting streams.
//!
//! This module defines [`StreamService`], the concrete implementation of the
//! [`StreamingService`] gRPC service. A call goes through:
//!
//! - `ACCEPTED`: the request reached the handler (authentication, if enabled,
//!   already happened in [`Authenticator`](super::auth::Authenticator)).
//! - `STREAMING`: a worker slot was acquired and the emission task runs.
//! - `COMPLETED`: the producer is exhausted and the stream ends with `OK`.
//!
//! Calls rejected by the interceptor never get here (`REJECTED`).

use crate::server::{
    config::ServerConfig,
    pool::manager::WorkerPool,
    streaming::{
        processor::stream_messages,
        producer::{MessageProducer, TokioSleep},
    },
    telemetry::{
        decrement_streams_inflight, increment_messages_sent, increment_requests,
        increment_stream_errors, increment_streams_inflight, record_stream_duration,
    },
};
use core::pin::Pin;
use futures::TryStreamExt;
use std::{sync::Arc, time::Instant};
use tidings_core::{
    Error,
    proto::{StreamRequest, StreamResponse, streaming_service_server::StreamingService},
    types::AuthenticatedUser,
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};

/// Streams `messages_per_stream` greetings per call, `pacing` apart.
///
/// Cheap to clone: the worker pool is shared behind an [`Arc`].
#[derive(Clone)]
pub struct StreamService {
    config: ServerConfig,
    producer: MessageProducer<TokioSleep>,
    worker_pool: Arc<WorkerPool>,
}

impl StreamService {
    pub fn new(config: ServerConfig) -> Self {
        let producer = MessageProducer::new(config.messages_per_stream, config.pacing);
        let worker_pool = WorkerPool::new(config.num_workers, config.shutdown_timeout);

        Self {
            config,
            producer,
            worker_pool: Arc::new(worker_pool),
        }
    }

    /// Stops admitting calls, drains in-flight ones, then cancels the rest.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.worker_pool.shutdown().await
    }
}

/// Picks the identity to stream for.
///
/// An authenticated user always wins over the id in the request body, so a
/// caller cannot stream for someone else by editing the message.
fn resolve_user_id(req: Request<StreamRequest>) -> String {
    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        return user.0.clone();
    }
    req.into_inner().user_id
}

#[tonic::async_trait]
impl StreamingService for StreamService {
    type StreamDataStream = Pin<Box<dyn Stream<Item = Result<StreamResponse, Status>> + Send>>;

    /// Handles one `StreamData` call.
    ///
    /// Waits for a worker slot, spawns the emission loop on it and returns
    /// the receiving end of a bounded channel as the response stream. Dropping
    /// that stream (client cancel or disconnect) stops the loop at its next
    /// suspension point and frees the slot.
    #[tracing::instrument(skip_all, fields(user_id = tracing::field::Empty))]
    async fn stream_data(
        &self,
        req: Request<StreamRequest>,
    ) -> Result<Response<Self::StreamDataStream>, Status> {
        let start = Instant::now();
        let user_id = resolve_user_id(req);
        tracing::Span::current().record("user_id", user_id.as_str());

        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<StreamResponse, Status>>(self.config.stream_buffer_size);

        let producer = self.producer;
        let shutdown = self.worker_pool.shutdown_token();
        let call_user = user_id.clone();

        let fut = async move {
            increment_requests();
            increment_streams_inflight();
            match stream_messages(call_user, producer, resp_tx, shutdown).await {
                Ok(sent) => {
                    tracing::debug!(sent, "Stream completed");
                }
                Err(e) => {
                    increment_stream_errors();
                    tracing::warn!("Stream ended early: {e}");
                }
            }
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_millis() as f64);
        };

        let fut = {
            use tracing::Instrument;
            fut.instrument(tracing::info_span!("streaming", user_id = %user_id))
        };

        if let Err(e) = self.worker_pool.spawn(fut).await {
            increment_stream_errors();
            return Err(e.into());
        }

        let stream = ReceiverStream::new(resp_rx).inspect_ok(|_| increment_messages_sent());

        Ok(Response::new(Box::pin(stream)))
    }
}
