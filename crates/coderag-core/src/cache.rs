//! Bounded, time-limited cache of retrieval results.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

struct Slot<V> {
    inserted: Instant,
    value: V,
}

struct Inner<V> {
    slots: HashMap<String, Slot<V>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Evicts the oldest entry at capacity and treats entries older than the TTL
/// as absent. A capacity of zero disables caching.
pub struct QueryCache<V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V> std::fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> QueryCache<V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Build the lookup key from its normalized parts.
    #[must_use]
    pub fn key(query: &str, parts: &[&str]) -> String {
        let mut key = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        for part in parts {
            key.push('\u{1f}');
            key.push_str(part);
        }
        key
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let mut inner = self.inner.lock().ok()?;
        let fresh = inner
            .slots
            .get(key)
            .map(|slot| slot.inserted.elapsed() < self.ttl)?;
        if fresh {
            inner.slots.get(key).map(|slot| slot.value.clone())
        } else {
            inner.slots.remove(key);
            inner.order.retain(|k| k != key);
            None
        }
    }

    pub fn insert(&self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.order.retain(|k| k != &key);
        while inner.slots.len() >= self.capacity && !inner.slots.contains_key(&key) {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.slots.remove(&oldest);
        }
        inner.order.push_back(key.clone());
        inner.slots.insert(
            key,
            Slot {
                inserted: Instant::now(),
                value,
            },
        );
    }

    /// Drop everything. Called after the index changes.
    pub fn invalidate(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.clear();
            inner.order.clear();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.slots.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
