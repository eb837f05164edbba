//! TTL caches for expensive per-key lookups
//!
//! One entry per cache: a map plus the time it was last refreshed. Age is
//! checked on read; nothing is evicted in the background. A lookup that
//! finds some keys missing fetches only those and merges them in.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Source of the current time, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

struct CacheEntry<K, V> {
    refreshed_at: Instant,
    values: HashMap<K, V>,
}

/// Key→value cache with a single refresh timestamp
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entry: Mutex<Option<CacheEntry<K, V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Values for `keys`, fetching whatever is missing or stale.
    ///
    /// `fetch` is called at most once, with exactly the keys that need
    /// fetching. Keys it leaves out of its result stay absent and are
    /// retried on the next lookup.
    ///
    /// All values share one refresh timestamp. A partial refresh moves it
    /// forward for every cached key, so values fetched earlier can be served
    /// for up to one TTL past their own age.
    pub async fn lookup<F, Fut>(&self, keys: &[K], fetch: F) -> HashMap<K, V>
    where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = HashMap<K, V>>,
    {
        let missing = self.missing_keys(keys);

        if !missing.is_empty() {
            debug!(
                requested = keys.len(),
                missing = missing.len(),
                "cache refresh"
            );
            let fetched = fetch(missing.clone()).await;
            let wanted: HashSet<&K> = missing.iter().collect();

            let now = self.clock.now();
            let mut guard = self.entry.lock();
            let entry = guard.get_or_insert_with(|| CacheEntry {
                refreshed_at: now,
                values: HashMap::new(),
            });
            entry
                .values
                .extend(fetched.into_iter().filter(|(k, _)| wanted.contains(k)));
            entry.refreshed_at = now;
        }

        let guard = self.entry.lock();
        let Some(entry) = guard.as_ref() else {
            return HashMap::new();
        };
        keys.iter()
            .filter_map(|k| entry.values.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Drop the entry; the next lookup fetches everything
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }

    /// Requested keys absent from a fresh entry. A stale entry is discarded
    /// and every requested key counts as missing.
    fn missing_keys(&self, keys: &[K]) -> Vec<K> {
        let now = self.clock.now();
        let mut guard = self.entry.lock();

        let fresh = guard
            .as_ref()
            .is_some_and(|entry| now.saturating_duration_since(entry.refreshed_at) < self.ttl);
        if !fresh {
            *guard = None;
        }

        let mut seen = HashSet::new();
        keys.iter()
            .filter(|k| seen.insert(*k))
            .filter(|k| {
                guard
                    .as_ref()
                    .is_none_or(|entry| !entry.values.contains_key(*k))
            })
            .cloned()
            .collect()
    }
}
