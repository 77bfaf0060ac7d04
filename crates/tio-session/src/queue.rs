//! A bounded, drop-oldest queue (§4.4 `pub_queue`, §5, §11.2).
//!
//! `tio_session.py`'s publish loop drains a stdlib `Queue.Queue` and, on
//! `Full`, pops the stale entry before pushing the new one rather than
//! blocking the reader task — keeping fresh samples over old ones. This is
//! the same policy, built on a `Mutex`-guarded deque instead of a blocking
//! queue so it composes with async tasks.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

/// A bounded queue that drops its oldest entry rather than the new one when
/// full.
pub struct DropOldestQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> DropOldestQueue<T> {
    /// A queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new() }
    }

    /// Push `item`. If the queue was already at capacity, its oldest entry
    /// is dropped and returned to the caller (so it can be logged).
    pub async fn push(&self, item: T) -> Option<T> {
        let mut guard = self.inner.lock().await;
        let dropped = if guard.len() >= self.capacity { guard.pop_front() } else { None };
        guard.push_back(item);
        drop(guard);
        self.notify.notify_one();
        dropped
    }

    /// Wait for and remove the oldest item.
    pub async fn pop(&self) -> T {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.inner.lock().await.pop_front() {
                return item;
            }
            notified.await;
        }
    }

    /// Remove the oldest item if one is present, without waiting.
    pub async fn try_pop(&self) -> Option<T> {
        self.inner.lock().await.pop_front()
    }

    /// Drop every queued item without returning them (§4.4 `stream_read`'s
    /// `flush` option).
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Current queue depth.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
