use super::signal::Signal;
use crate::error::SiestaError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Unbounded FIFO queue with cooperative (async) consumers.
///
/// Producers never block. Consumers suspend in [`poll`](Self::poll) until an
/// element is available. Elements come out in the order their `push` was
/// applied under the lock, and each element is delivered to exactly one
/// `poll`.
#[derive(Debug)]
pub struct AsyncQueue<T> {
    signal: Signal,
    items: Mutex<VecDeque<T>>,
}

impl<T> AsyncQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append `value` and wake one consumer.
    ///
    /// Growing the backing storage can fail; that is reported as
    /// [`SiestaError::ResourceExhausted`] and `value` is dropped.
    pub fn push(&self, value: T) -> Result<(), SiestaError> {
        {
            let mut items = self.items.lock();
            items
                .try_reserve(1)
                .map_err(|_| SiestaError::ResourceExhausted)?;
            items.push_back(value);
        }
        self.signal.wake_one();
        Ok(())
    }

    /// Wait for the head element and remove it.
    pub async fn poll(&self) -> T {
        self.signal.wait_until(|| self.items.lock().pop_front()).await
    }

    /// Remove the head element if there is one.
    pub fn try_poll(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-blocking FIFO queue for consumers running on dedicated threads.
///
/// Same ordering contract as [`AsyncQueue`]; `poll` parks the calling thread
/// instead of suspending a task, so never call it from inside the runtime.
#[derive(Debug)]
pub struct SimpleBlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> SimpleBlockingQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, value: T) -> Result<(), SiestaError> {
        let mut items = self.items.lock();
        items
            .try_reserve(1)
            .map_err(|_| SiestaError::ResourceExhausted)?;
        items.push_back(value);
        self.available.notify_one();
        Ok(())
    }

    /// Block the current thread until an element is available, then remove it.
    pub fn poll(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                return value;
            }
            self.available.wait(&mut items);
        }
    }

    /// Like [`poll`](Self::poll) but gives up after `timeout`.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                return Some(value);
            }
            if self.available.wait_for(&mut items, timeout).timed_out() {
                return items.pop_front();
            }
        }
    }

    pub fn try_poll(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for SimpleBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Move-only payload; the queue must never need `Clone`.
    #[derive(Debug, PartialEq, Eq)]
    struct MovableObject(i32);

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = AsyncQueue::new();
        for i in 1..=3 {
            queue.push(MovableObject(i)).expect("push");
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.poll().await, MovableObject(1));
        assert_eq!(queue.poll().await, MovableObject(2));
        assert_eq!(queue.poll().await, MovableObject(3));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_poll_waits_for_push() {
        let queue = Arc::new(AsyncQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.poll().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push(MovableObject(42)).expect("push");
        let value = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake")
            .expect("consumer should not panic");
        assert_eq!(value, MovableObject(42));
    }

    #[test]
    fn test_blocking_queue_across_threads() {
        let queue = Arc::new(SimpleBlockingQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || (0..4).map(|_| queue.poll()).collect::<Vec<_>>())
        };
        for i in 0..4 {
            queue.push(i).expect("push");
        }
        let received = consumer.join().expect("consumer thread");
        assert_eq!(received, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_blocking_poll_timeout() {
        let queue: SimpleBlockingQueue<u8> = SimpleBlockingQueue::new();
        assert_eq!(queue.poll_timeout(Duration::from_millis(10)), None);
        queue.push(9).expect("push");
        assert_eq!(queue.poll_timeout(Duration::from_millis(10)), Some(9));
    }
}
