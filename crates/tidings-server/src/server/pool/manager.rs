//! Bounded pool of call tasks.
//!
//! This module defines the [`WorkerPool`], which caps how many calls stream
//! at the same time. Every admitted call holds one slot (a semaphore permit)
//! for its whole lifetime and runs as its own Tokio task, so one call's pacing
//! delay never holds up another. Calls beyond the bound wait for a slot.
//!
//! The pool also owns the shutdown sequence: refuse new calls, let in-flight
//! calls drain for a while, then cancel whatever is left.

use core::{future::Future, time::Duration};
use std::sync::Arc;
use tidings_core::Error;
use tokio::{sync::Semaphore, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How long cancelled tasks get to wind down after the drain phase.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Creates a pool with `size` slots.
    pub fn new(size: usize, shutdown_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Token cancelled once the drain phase of [`shutdown`](Self::shutdown)
    /// is over. Call tasks watch it to stop early.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Number of calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Whether the pool has stopped admitting calls.
    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Waits for a free slot, then runs `job` on its own task.
    ///
    /// The slot is released when `job` completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if the pool is shutting down, either
    /// before or while waiting for a slot.
    pub async fn spawn<F>(&self, job: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = tokio::select! {
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| Error::ServiceShutdown)?
            }
            () = self.shutdown_token.cancelled() => return Err(Error::ServiceShutdown),
        };

        self.tracker.spawn(async move {
            job.await;
            drop(permit);
        });

        Ok(())
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Closes the slot semaphore so no new call is admitted.
    /// - Waits up to `shutdown_timeout` for in-flight calls to finish.
    /// - Cancels the shared [`CancellationToken`] so remaining calls stop at
    ///   their next suspension point, and waits a little longer for them.
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new calls ===
        tracing::info!("Refusing new calls");
        self.slots.close();
        self.tracker.close();

        // === Phase 1: Let in-flight calls drain ===
        tracing::info!("Draining in-flight calls ({} active)", self.in_flight());
        match timeout(self.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                tracing::debug!("All in-flight calls drained");
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.in_flight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.shutdown_token.cancel();

        if timeout(CANCEL_GRACE, self.tracker.wait()).await.is_err() {
            tracing::warn!("{} calls did not stop after cancellation", self.in_flight());
        }

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn runs_up_to_size_calls_at_once() {
        let pool = Arc::new(WorkerPool::new(2, Duration::from_secs(1)));
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let mut release = release_rx.clone();
            let started = Arc::clone(&started);
            pool.spawn(async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _ = release.wait_for(|r| *r).await;
            })
            .await
            .unwrap();
        }

        // Third call waits for a slot.
        let third = {
            let pool = Arc::clone(&pool);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                pool.spawn(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 2);
        assert!(!third.is_finished());

        release_tx.send(true).unwrap();
        third.await.unwrap().unwrap();
        pool.shutdown().await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn refuses_calls_after_shutdown() {
        let pool = WorkerPool::new(1, Duration::from_millis(10));
        pool.shutdown().await.unwrap();

        assert!(pool.is_closed());
        let res = pool.spawn(async {}).await;
        assert!(matches!(res, Err(Error::ServiceShutdown)));
    }

    #[tokio::test]
    async fn shutdown_cancels_calls_that_outlive_the_drain() {
        let pool = WorkerPool::new(1, Duration::from_millis(20));
        let token = pool.shutdown_token();
        let (done_tx, done_rx) = oneshot::channel();

        pool.spawn(async move {
            token.cancelled().await;
            let _ = done_tx.send(());
        })
        .await
        .unwrap();

        pool.shutdown().await.unwrap();
        done_rx.await.unwrap();
        assert_eq!(pool.in_flight(), 0);
    }
}
