//! Lazy, paced message generation.
//!
//! A [`MessageProducer`] turns a user id into a finite [`Stream`] of
//! greetings. Items are computed on demand: the first one is ready
//! immediately and every following one becomes ready after the pacing delay
//! has elapsed. How the delay is awaited is left to a [`SleepProvider`], so
//! the producer itself never blocks a thread.

use core::{future::Future, marker::PhantomData, time::Duration};
use futures::{Stream, stream};

/// Abstracts over how to wait for a [`Duration`] in async contexts.
pub trait SleepProvider {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}

/// [`SleepProvider`] backed by Tokio's timer.
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(dur)
    }
}

/// Formats the `index`-th (1-based) greeting for `user_id`.
pub fn message(user_id: &str, index: usize) -> String {
    format!("Hello {user_id}, this is message {index}")
}

/// Produces `count` greetings per user, `pacing` apart.
pub struct MessageProducer<S = TokioSleep> {
    count: usize,
    pacing: Duration,
    _sleep: PhantomData<fn() -> S>,
}

impl<S> Clone for MessageProducer<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for MessageProducer<S> {}

impl<S> core::fmt::Debug for MessageProducer<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageProducer")
            .field("count", &self.count)
            .field("pacing", &self.pacing)
            .finish()
    }
}

impl<S: SleepProvider + 'static> MessageProducer<S> {
    pub const fn new(count: usize, pacing: Duration) -> Self {
        Self {
            count,
            pacing,
            _sleep: PhantomData,
        }
    }

    /// Returns the greetings for `user_id`, in order.
    ///
    /// The stream is finite, cannot be restarted, and awaits the pacing delay
    /// between two items only: nothing is awaited before the first item or
    /// after the last one.
    pub fn produce(&self, user_id: &str) -> impl Stream<Item = String> + Send + 'static {
        let count = self.count;
        let pacing = self.pacing;

        stream::unfold(
            (1_usize, user_id.to_owned()),
            move |(index, user_id)| async move {
                if index > count {
                    return None;
                }
                if index > 1 && !pacing.is_zero() {
                    S::sleep_for(pacing).await;
                }
                let item = message(&user_id, index);
                Some((item, (index + 1, user_id)))
            },
        )
    }
}
