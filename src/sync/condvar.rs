use super::signal::Signal;
use crate::error::{Phase, SiestaError};
use std::time::Duration;

/// Predicate-guarded wait over a [`Signal`].
///
/// The condition itself lives in the caller's closure; the condition variable
/// only tells waiters when to look again. After [`wait`](Self::wait) returns,
/// the predicate was true at the moment of completion. It may stop being true
/// as soon as the caller yields again.
///
/// ```rust
/// use siesta::sync::AsyncConditionVariable;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cv = AsyncConditionVariable::new();
/// let ready = AtomicBool::new(true);
/// cv.wait(|| ready.load(Ordering::SeqCst)).await;
/// # }
/// ```
#[derive(Debug, Default)]
pub struct AsyncConditionVariable {
    signal: Signal,
}

impl AsyncConditionVariable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until `predicate()` returns true.
    ///
    /// An already-true predicate completes on the first poll without
    /// suspending; otherwise the predicate is re-checked after every wake.
    pub async fn wait<P>(&self, mut predicate: P)
    where
        P: FnMut() -> bool,
    {
        self.signal.wait_until(|| predicate().then_some(())).await;
    }

    /// Like [`wait`](Self::wait) for predicates that can fail. The first
    /// error completes the wait with that error.
    pub async fn try_wait<P, E>(&self, mut predicate: P) -> Result<(), E>
    where
        P: FnMut() -> Result<bool, E>,
    {
        self.signal
            .try_wait_until(|| predicate().map(|ready| ready.then_some(())))
            .await
    }

    /// Bounded [`wait`](Self::wait). Expiry yields `Timeout { phase: Wait }`.
    pub async fn wait_timeout<P>(&self, predicate: P, timeout: Duration) -> Result<(), SiestaError>
    where
        P: FnMut() -> bool,
    {
        tokio::time::timeout(timeout, self.wait(predicate))
            .await
            .map_err(|_| SiestaError::Timeout { phase: Phase::Wait })
    }

    pub fn notify_one(&self) {
        self.signal.wake_one();
    }

    pub fn notify_all(&self) {
        self.signal.wake_all();
    }
}
