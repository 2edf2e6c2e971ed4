//! # Sync Module
//!
//! Cooperative wait primitives for tasks running on the tokio runtime.
//!
//! ## Overview
//!
//! Every primitive here is built from one zero-payload notification channel,
//! [`Signal`]. A wait is always a loop:
//!
//! 1. register for the next wake,
//! 2. check the shared condition, returning immediately if it holds,
//! 3. suspend until woken, then go back to 1.
//!
//! Registering *before* checking means a wake issued between the check and the
//! suspension is never lost. The price is that wakes can be spurious, so
//! every consumer re-checks its condition after waking.
//!
//! | Primitive | Shared state | Wake on |
//! |-----------|--------------|---------|
//! | [`AsyncConditionVariable`] | caller's predicate | `notify_one` / `notify_all` |
//! | [`AsyncCountingSemaphore`] | permit counter in `[0, N]` | `release` |
//! | [`AsyncQueue`] | FIFO sequence | `push` |
//! | [`SimpleBlockingQueue`] | FIFO sequence | `push` (thread-blocking) |
//!
//! These primitives are independent of the HTTP sessions; use them to build
//! producer/consumer pipelines in front of request handlers.

mod condvar;
mod queue;
mod semaphore;
mod signal;

pub use condvar::AsyncConditionVariable;
pub use queue::{AsyncQueue, SimpleBlockingQueue};
pub use semaphore::{AsyncCountingSemaphore, SemaphorePermit};
pub use signal::Signal;
