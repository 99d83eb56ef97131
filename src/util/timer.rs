//! Cancellable deferred tasks keyed by owner

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// At most one pending deadline per key; scheduling again replaces it
#[derive(Debug, Clone)]
pub struct DeferredTasks<K> {
    deadlines: HashMap<K, Duration>,
}

impl<K> DeferredTasks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }

    /// Schedule `key` to fire at `at`, returning the deadline it replaced
    pub fn schedule(&mut self, key: K, at: Duration) -> Option<Duration> {
        self.deadlines.insert(key, at)
    }

    /// Drop the pending task for `key`. Returns true if one was pending.
    pub fn cancel<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.deadlines.remove(key).is_some()
    }

    pub fn deadline<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.deadlines.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Remove and return every key whose deadline is at or before `now`, in key order
    pub fn drain_due(&mut self, now: Duration) -> Vec<K> {
        let mut due: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        due.sort_unstable();

        for key in &due {
            self.deadlines.remove(key);
        }
        due
    }
}

impl<K> Default for DeferredTasks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
