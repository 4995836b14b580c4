use std::{
    collections::{HashMap, HashSet, VecDeque},
    hash::Hash,
    sync::Mutex,
    time::Duration,
};

use tokio::{
    sync::{watch, Notify},
    time::Instant,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A de-duplicating work queue shared by a pool of workers.
///
/// Each key is in at most one of four places: pending (ready to hand out), processing (handed to
/// a worker), dirty (re-added while processing, handed out again once the worker is done) or
/// waiting (scheduled for a delayed retry). Adding a key that is already pending, dirty or
/// waiting replaces its value. The queue tracks how many units of work are outstanding so callers
/// can wait for it to go idle.
#[derive(Debug)]
pub struct WorkQueue<K, V> {
    state: Mutex<QueueState<K, V>>,
    notify: Notify,
    outstanding: watch::Sender<usize>,
}

/// What a worker reports when it is done with an item.
#[derive(Debug)]
pub enum Outcome<V> {
    /// The item is finished, successfully or not.
    Finished,

    /// The item should be handed out again after the delay.
    Retry(V, Duration),
}

#[derive(Debug)]
struct QueueState<K, V> {
    order: VecDeque<K>,
    pending: HashMap<K, V>,
    processing: HashSet<K>,
    dirty: HashMap<K, V>,
    waiting: HashMap<K, (V, Instant)>,
    shutting_down: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<K, V> WorkQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                pending: HashMap::new(),
                processing: HashSet::new(),
                dirty: HashMap::new(),
                waiting: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            outstanding,
        }
    }

    /// Adds an item without blocking.
    ///
    /// Returns `true` if this added a unit of outstanding work, `false` if it replaced the value
    /// of a key that was already queued.
    pub fn add(&self, key: K, value: V) -> bool {
        let mut state = self.lock();

        if let Some(slot) = state.pending.get_mut(&key) {
            *slot = value;
            return false;
        }

        if let Some((slot, _)) = state.waiting.get_mut(&key) {
            *slot = value;
            return false;
        }

        if state.processing.contains(&key) {
            let is_new = state.dirty.insert(key, value).is_none();
            if is_new {
                self.outstanding.send_modify(|n| *n += 1);
            }
            return is_new;
        }

        state.order.push_back(key.clone());
        state.pending.insert(key, value);
        self.outstanding.send_modify(|n| *n += 1);
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Waits for the next item and marks it as processing.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<(K, V)> {
        loop {
            let notified = self.notify.notified();

            let next_due = {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }

                state.promote_due(Instant::now());
                if let Some(item) = state.pop() {
                    return Some(item);
                }

                state.waiting.values().map(|(_, due)| *due).min()
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Reports that a worker is done with `key`.
    ///
    /// A retry is skipped when a newer value was added while the item was processing; the newer
    /// value is handed out instead.
    pub fn done(&self, key: &K, outcome: Outcome<V>) {
        let mut state = self.lock();
        state.processing.remove(key);

        let mut finished = 0;
        match outcome {
            Outcome::Finished => finished += 1,
            Outcome::Retry(value, delay) => {
                if state.dirty.contains_key(key) {
                    finished += 1;
                } else {
                    state
                        .waiting
                        .insert(key.clone(), (value, Instant::now() + delay));
                }
            }
        }

        if let Some(value) = state.dirty.remove(key) {
            state.order.push_back(key.clone());
            state.pending.insert(key.clone(), value);
        }

        if finished > 0 {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(finished));
        }
        drop(state);

        // Wake a worker to pick up re-queued work or recompute its retry deadline
        self.notify.notify_one();
    }

    /// Number of outstanding units of work: pending, processing, dirty or waiting.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Waits until no work is outstanding.
    pub async fn wait_idle(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives as long as the queue, so this only fails if the queue is gone
        let _ = receiver.wait_for(|n| *n == 0).await;
    }

    /// Stops handing out items. Workers blocked in [`get`](Self::get) return `None`.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Whether [`shut_down`](Self::shut_down) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<K, V>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K, V> QueueState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn pop(&mut self) -> Option<(K, V)> {
        while let Some(key) = self.order.pop_front() {
            if let Some(value) = self.pending.remove(&key) {
                self.processing.insert(key.clone());
                return Some((key, value));
            }
        }
        None
    }

    fn promote_due(&mut self, now: Instant) {
        let due: Vec<K> = self
            .waiting
            .iter()
            .filter(|(_, (_, at))| *at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in due {
            if let Some((value, _)) = self.waiting.remove(&key) {
                self.order.push_back(key.clone());
                self.pending.insert(key, value);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<K, V> Default for WorkQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_pending_items_are_deduplicated() {
        let queue = WorkQueue::new();
        assert!(queue.add("pod/a", 1));
        assert!(queue.add("pod/b", 1));
        assert!(!queue.add("pod/a", 2));
        assert_eq!(queue.outstanding(), 2);

        assert_eq!(queue.get().await, Some(("pod/a", 2)));
        assert_eq!(queue.get().await, Some(("pod/b", 1)));
    }

    #[tokio::test]
    async fn test_add_while_processing_requeues_after_done() {
        let queue = WorkQueue::new();
        queue.add("pod/a", 1);
        let (key, _) = queue.get().await.expect("item");

        assert!(queue.add("pod/a", 2));
        assert!(!queue.add("pod/a", 3));
        assert_eq!(queue.outstanding(), 2);

        queue.done(&key, Outcome::Finished);
        assert_eq!(queue.outstanding(), 1);
        assert_eq!(queue.get().await, Some(("pod/a", 3)));
    }

    #[tokio::test]
    async fn test_retry_is_delayed_and_keeps_work_outstanding() {
        let queue = WorkQueue::new();
        queue.add("pod/a", 1);
        let (key, value) = queue.get().await.expect("item");

        let started = Instant::now();
        queue.done(&key, Outcome::Retry(value, Duration::from_millis(50)));
        assert_eq!(queue.outstanding(), 1);

        assert_eq!(queue.get().await, Some(("pod/a", 1)));
        assert!(started.elapsed() >= Duration::from_millis(50));

        queue.done(&key, Outcome::Finished);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_newer_value_supersedes_retry() {
        let queue = WorkQueue::new();
        queue.add("pod/a", 1);
        let (key, value) = queue.get().await.expect("item");
        queue.add("pod/a", 2);

        queue.done(&key, Outcome::Retry(value, Duration::from_secs(60)));
        assert_eq!(queue.outstanding(), 1);
        assert_eq!(queue.get().await, Some(("pod/a", 2)));
    }

    #[tokio::test]
    async fn test_wait_idle_and_shut_down() {
        let queue = Arc::new(WorkQueue::new());
        queue.add("pod/a", 1);

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                while let Some((key, _)) = queue.get().await {
                    queue.done(&key, Outcome::Finished);
                }
            })
        };

        queue.wait_idle().await;
        assert_eq!(queue.outstanding(), 0);

        queue.shut_down();
        worker.await.expect("worker exits after shut down");
        assert!(queue.is_shutting_down());
    }
}
