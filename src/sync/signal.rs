//! Zero-payload wake channel shared by every wait primitive in this module.
//!
//! A [`Signal`] carries no data: waking only says "something happened".
//! Consumers re-examine their shared state after every wake because wakes can
//! be spurious. A `wake_one` issued while nobody waits is remembered as a
//! single stored permit, which the next registration consumes immediately.

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Signal {
    notify: Notify,
}

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for the next wake.
    ///
    /// The registration only observes wakes issued after it has been enabled
    /// (or first polled). Callers that check shared state must pin and
    /// [`enable`](Notified::enable) the registration *before* the check.
    pub fn arm(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Wake one registered waiter, or store a single permit if none is waiting.
    pub fn wake_one(&self) {
        self.notify.notify_one();
    }

    /// Wake every registered waiter. Nothing is stored for later registrations.
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Suspend until `attempt` yields a value, re-arming between attempts.
    ///
    /// `attempt` runs before the first suspension, so an already-satisfied
    /// condition completes on the first poll. A successful attempt and the
    /// return happen in the same poll: there is no suspension point between
    /// observing the condition and resuming the caller.
    pub(crate) async fn wait_until<T, F>(&self, mut attempt: F) -> T
    where
        F: FnMut() -> Option<T>,
    {
        loop {
            let armed = self.arm();
            tokio::pin!(armed);
            armed.as_mut().enable();
            if let Some(value) = attempt() {
                return value;
            }
            armed.await;
        }
    }

    /// Like [`wait_until`](Self::wait_until) but an `Err` from `attempt`
    /// completes the wait with that error.
    pub(crate) async fn try_wait_until<T, E, F>(&self, mut attempt: F) -> Result<T, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        loop {
            let armed = self.arm();
            tokio::pin!(armed);
            armed.as_mut().enable();
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            armed.await;
        }
    }
}
