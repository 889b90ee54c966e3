//! Rate-limited deduplicating work queue.
//!
//! Multiple producers enqueue keys, multiple workers drain them. A key that
//! is already queued is not queued twice, and a key re-added while a worker
//! is processing it is parked and re-queued once the worker calls
//! [`WorkQueue::done`], so at most one reconcile per key is ever in flight.
//!
//! Failed keys come back through [`WorkQueue::add_rate_limited`], which
//! applies per-key exponential backoff until [`WorkQueue::forget`] resets it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

const BASE_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_secs(1000);

struct Inner<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    failures: HashMap<T, u32>,
    shut_down: bool,
}

pub struct WorkQueue<T> {
    inner: Arc<Mutex<Inner<T>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shut_down: false,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueues an item. Re-adding an item that is already queued is a no-op;
    /// re-adding one that is being processed parks it until `done`.
    pub fn add(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.shut_down || inner.dirty.contains(&item) {
            return;
        }
        inner.dirty.insert(item.clone());
        if inner.processing.contains(&item) {
            return;
        }
        inner.queue.push_back(item);
        drop(inner);
        self.notify.notify_one();
    }

    /// Enqueues after the item's current backoff delay. Each call without an
    /// intervening `forget` doubles the delay, up to [`MAX_DELAY`].
    pub fn add_rate_limited(&self, item: T) {
        let delay = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            let failures = inner.failures.entry(item.clone()).or_insert(0);
            *failures += 1;
            backoff_delay(*failures)
        };
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Clears the item's failure history so its next retry starts fresh.
    pub fn forget(&self, item: &T) {
        self.inner.lock().failures.remove(item);
    }

    /// Waits for the next item. Returns `None` once the queue is shut down
    /// and every pending wakeup has been consumed.
    pub async fn get(&self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.queue.pop_front() {
                    inner.dirty.remove(&item);
                    inner.processing.insert(item.clone());
                    let more = !inner.queue.is_empty();
                    drop(inner);
                    if more {
                        // Chain the wakeup so a burst of adds cannot strand
                        // a second consumer.
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if inner.shut_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Releases the in-flight marker. If the item was re-added while being
    /// processed, it is queued again now.
    pub fn done(&self, item: &T) {
        let mut inner = self.inner.lock();
        inner.processing.remove(item);
        if inner.dirty.contains(item) && !inner.queue.contains(item) {
            inner.queue.push_back(item.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Stops accepting new items and wakes every blocked consumer.
    pub fn shut_down(&self) {
        self.inner.lock().shut_down = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(63);
    BASE_DELAY
        .checked_mul(2u32.saturating_pow(exp))
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}
