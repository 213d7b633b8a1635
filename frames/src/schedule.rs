//! Deadline scheduler for cancellable deferred work.
//!
//! DESIGN
//! ======
//! Timers are plain data: a key and the instant it falls due. The owner
//! asks for [`Scheduler::next_deadline`], sleeps until then, and drains
//! [`Scheduler::pop_due`]. Nothing runs on a background task, so a cancelled
//! timer can never fire late against state that has moved on.
//!
//! Keys identify owner and kind together. Scheduling an existing key
//! replaces its deadline, which gives "at most one timer per owner+kind"
//! and debounce-restart for free.

use std::collections::HashMap;
use std::hash::Hash;

/// Pending deadlines keyed by `K`, ordered by an instant type `T`.
#[derive(Debug, Clone)]
pub struct Scheduler<K, T> {
    pending: HashMap<K, T>,
}

impl<K, T> Default for Scheduler<K, T> {
    fn default() -> Self {
        Self { pending: HashMap::new() }
    }
}

impl<K, T> Scheduler<K, T>
where
    K: Eq + Hash + Clone,
    T: Ord + Copy,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to fall due at `at`. Returns true if an earlier
    /// deadline for the same key was replaced.
    pub fn schedule(&mut self, key: K, at: T) -> bool {
        self.pending.insert(key, at).is_some()
    }

    /// Cancel one timer. Returns true if it was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Cancel every timer whose key matches `predicate`, returning how many
    /// were dropped. Used to release everything an owner holds at teardown.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| !predicate(key));
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    #[must_use]
    pub fn deadline(&self, key: &K) -> Option<T> {
        self.pending.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest pending deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<T> {
        self.pending.values().min().copied()
    }

    /// Remove and return every key due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: T) -> Vec<K> {
        let mut due: Vec<(T, K)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, key.clone()))
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, key) in &due {
            self.pending.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
