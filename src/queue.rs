//! Bounded FIFO queue shared between producers and consumers.
//!
//! One instance feeds the server's worker pool (the ingress queue) and one
//! instance sits in front of every connection writer (the outgoing queue).
//! Enqueueing never waits: a full queue is reported to the producer, which
//! decides what to drop or synthesize. Dequeueing suspends until an item,
//! the optional timeout, or `close`.
//!
//! tokio's own `mpsc` channel is single-consumer and cannot feed N workers,
//! so this queue is built from a mutex-guarded `VecDeque` woken through
//! [`Notify`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity multi-producer multi-consumer FIFO.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    depth: AtomicUsize,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            depth: AtomicUsize::new(0),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item without waiting.
    ///
    /// Returns `false` when the queue is full or closed; the item is
    /// dropped.
    pub fn try_enqueue(&self, item: T) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed || inner.items.len() >= self.capacity {
                return false;
            }
            inner.items.push_back(item);
            self.depth.store(inner.items.len(), Ordering::Release);
        }
        self.notify.notify_one();
        true
    }

    /// Remove the oldest item, waiting up to `timeout` (forever if `None`).
    ///
    /// Returns `None` on timeout, or once the queue is closed and drained.
    pub async fn dequeue(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            // Register for a wakeup before checking, so an enqueue between
            // the check and the await is not lost.
            let notified = self.notify.notified();

            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    self.depth.store(inner.items.len(), Ordering::Release);
                    if !inner.items.is_empty() {
                        // Pass the wakeup on to the next waiting consumer.
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if inner.closed {
                    drop(inner);
                    // Re-arm the close permit for the next late consumer.
                    self.notify.notify_one();
                    return None;
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Approximate number of queued items, for stats.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Check if the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the queue will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the queue and wake every blocked consumer.
    ///
    /// Items already queued are still handed out; enqueues after close
    /// fail.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        // notify_waiters only reaches consumers already parked on the
        // Notified future. One between its closed-check and its await
        // would miss it; a stored permit covers that window, and every
        // consumer observing the close re-arms it on the way out.
        self.notify.notify_one();
    }

    /// Check if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
