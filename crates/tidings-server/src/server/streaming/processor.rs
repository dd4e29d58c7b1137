use super::producer::{MessageProducer, SleepProvider};
use core::time::Duration;
use futures::StreamExt;
use tidings_core::{Error, proto::StreamResponse};
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// How long a shutdown status may wait for room in a full response buffer.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Runs the emission loop of one call.
///
/// Pulls greetings from the [`MessageProducer`] and forwards each one as a
/// [`StreamResponse`] through `resp_tx`, preserving order. The loop only ever
/// waits at two places: the pacing delay inside the producer and the send into
/// the bounded channel. At both points it also watches for the client going
/// away (`resp_tx` closed) and for server shutdown (`shutdown` cancelled), and
/// stops there.
///
/// # Returns
///
/// - `Ok(n)` with the number of messages delivered once the producer is
///   exhausted.
/// - [`Error::RequestCancelled`] when the client stopped consuming.
/// - [`Error::ServiceShutdown`] when the server is shutting down. The call is
///   terminated with an `UNAVAILABLE` status, queued behind any message still
///   buffered. A client that reads nothing for [`ABORT_GRACE`] is not waited
///   for.
pub async fn stream_messages<S: SleepProvider + 'static>(
    user_id: String,
    producer: MessageProducer<S>,
    resp_tx: mpsc::Sender<Result<StreamResponse, Status>>,
    shutdown: CancellationToken,
) -> tidings_core::Result<usize> {
    let mut messages = Box::pin(producer.produce(&user_id));
    let mut sent = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return abort(&resp_tx, &user_id).await,
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = messages.next() => next,
        };

        let Some(message) = next else {
            return Ok(sent);
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return abort(&resp_tx, &user_id).await,
            res = resp_tx.send(Ok(StreamResponse { message })) => {
                if res.is_err() {
                    return Err(Error::RequestCancelled);
                }
            }
        }

        sent += 1;
    }
}

async fn abort(
    resp_tx: &mpsc::Sender<Result<StreamResponse, Status>>,
    user_id: &str,
) -> tidings_core::Result<usize> {
    match timeout(ABORT_GRACE, resp_tx.send(Err(Error::ServiceShutdown.into()))).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::debug!(user_id, "Client gone before shutdown status"),
        Err(_) => tracing::warn!(user_id, "Shutdown status not delivered within {ABORT_GRACE:?}"),
    }
    Err(Error::ServiceShutdown)
}
