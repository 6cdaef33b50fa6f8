//! Interruptible wait primitive used between poll cycles.

use core::time::Duration;

use tokio::{sync::Notify, time::timeout};

/// A timed wait that other tasks can cut short.
///
/// Wakes are not counted: any number of [`Waiter::notify`] calls made while
/// nobody is waiting collapse into a single early return of the next
/// [`Waiter::wait`].
#[derive(Debug, Default)]
pub struct Waiter {
    notify: Notify,
}

impl Waiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends until `duration` elapses or [`Waiter::notify`] is called.
    pub async fn wait(&self, duration: Duration) {
        drop(timeout(duration, self.notify.notified()).await);
    }

    /// Wakes the current waiter, or the next one if nobody is waiting yet.
    pub fn notify(&self) {
        self.notify.notify_one();
    }
}
