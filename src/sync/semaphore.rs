use super::signal::Signal;
use crate::error::SiestaError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counting semaphore with at most `N` permits.
///
/// Invariant: the permit counter stays within `[0, N]`.
///
/// # Wake-up semantics
///
/// `acquire` takes the permit inside the same poll that observes it; there is
/// no suspension point between "a permit is available" and "the caller owns
/// it", so a concurrent acquirer cannot steal a permit out from under a woken
/// waiter. Waiters are *not* served in FIFO order: whichever woken or newly
/// arriving task wins the compare-and-swap proceeds.
#[derive(Debug)]
pub struct AsyncCountingSemaphore<const N: usize> {
    signal: Signal,
    permits: AtomicUsize,
}

/// Permit held until dropped (or [`forget`](SemaphorePermit::forget)-ed).
#[must_use = "dropping the permit releases it immediately"]
#[derive(Debug)]
pub struct SemaphorePermit<'a, const N: usize> {
    sem: &'a AsyncCountingSemaphore<N>,
    released: bool,
}

impl<const N: usize> AsyncCountingSemaphore<N> {
    pub const MAX: usize = N;

    /// A semaphore with all `N` permits available.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            permits: AtomicUsize::new(N),
        }
    }

    /// A semaphore starting with `initial` permits available.
    pub fn with_permits(initial: usize) -> Result<Self, SiestaError> {
        if initial > N {
            return Err(SiestaError::InvalidInitialPermits {
                requested: initial,
                max: N,
            });
        }
        Ok(Self {
            signal: Signal::new(),
            permits: AtomicUsize::new(initial),
        })
    }

    /// Permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }

    /// Take one permit without waiting.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_, N>> {
        self.take().then(|| SemaphorePermit {
            sem: self,
            released: false,
        })
    }

    /// Wait for a permit.
    pub async fn acquire(&self) -> SemaphorePermit<'_, N> {
        self.signal.wait_until(|| self.try_acquire()).await
    }

    /// Return one permit and wake one waiter.
    ///
    /// Releasing into a full semaphore is a usage error and leaves the
    /// counter untouched.
    pub fn release(&self) -> Result<(), SiestaError> {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < N).then_some(n + 1)
            })
            .map_err(|_| SiestaError::SemaphoreOverflow { max: N })?;
        self.signal.wake_one();
        Ok(())
    }

    fn take(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<const N: usize> Default for AsyncCountingSemaphore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SemaphorePermit<'_, N> {
    /// Keep the permit taken; release it later through
    /// [`AsyncCountingSemaphore::release`].
    pub fn forget(mut self) {
        self.released = true;
    }
}

impl<const N: usize> Drop for SemaphorePermit<'_, N> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // A live permit accounts for one taken slot, so this only fails if
        // someone called `release` for a permit they did not forget.
        if let Err(err) = self.sem.release() {
            tracing::error!(error = %err, "permit dropped into a full semaphore");
        }
    }
}
