//! Deduplicating work queue with delayed and rate-limited adds.
//!
//! A key is queued at most once no matter how many times it is added, and
//! is never handed to two workers at once: adding a key that is being
//! processed marks it dirty, and [`WorkQueue::done`] queues it again.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::retry::exponential_delay;

struct QueueState<K> {
    ready: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    delayed: HashMap<K, Instant>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

/// Work queue feeding reconciliation passes.
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

impl<K> std::fmt::Debug for WorkQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl<K: Clone + Eq + Hash> WorkQueue<K> {
    /// Create a queue whose rate-limited adds back off from `base_delay`
    /// up to `max_delay`.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                delayed: HashMap::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            base_delay,
            max_delay,
        }
    }

    // Every mutation completes under the lock; poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `key` now.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        state.delayed.remove(&key);
        if !state.processing.contains(&key) {
            state.ready.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Queue `key` once `delay` has elapsed. An earlier pending deadline wins.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let deadline = Instant::now() + delay;
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        let entry = state.delayed.entry(key).or_insert(deadline);
        if deadline < *entry {
            *entry = deadline;
        }
        drop(state);
        // Wake the consumer so it re-arms its timer.
        self.notify.notify_one();
    }

    /// Queue `key` after a delay that doubles with each consecutive failure.
    pub fn add_rate_limited(&self, key: K) {
        let attempt = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures += 1;
            *failures - 1
        };
        self.add_after(key, exponential_delay(self.base_delay, attempt, self.max_delay));
    }

    /// Reset the failure count of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().failures.remove(key);
    }

    /// Consecutive failures recorded for `key`.
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let wake_at = {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                promote_due(&mut state, Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.delayed.values().min().copied()
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        () = self.notify.notified() => {},
                        () = tokio::time::sleep_until(deadline) => {},
                    }
                },
                None => self.notify.notified().await,
            }
        }
    }

    /// Finish processing `key`; requeues it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.ready.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// No key ready, dirty or in flight. Pending delayed adds do not count.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.ready.is_empty() && state.dirty.is_empty() && state.processing.is_empty()
    }

    /// Stop handing out keys and drop all pending work.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        state.ready.clear();
        state.dirty.clear();
        state.delayed.clear();
        drop(state);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

fn promote_due<K: Clone + Eq + Hash>(state: &mut QueueState<K>, now: Instant) {
    let due: Vec<K> = state
        .delayed
        .iter()
        .filter(|(_, deadline)| **deadline <= now)
        .map(|(key, _)| key.clone())
        .collect();

    for key in due {
        state.delayed.remove(&key);
        if state.dirty.insert(key.clone()) && !state.processing.contains(&key) {
            state.ready.push_back(key);
        }
    }
}
