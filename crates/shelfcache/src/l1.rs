//! L1Cache: bounded in-memory store with lazy expiry

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ahash::RandomState;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::L1Config;
use crate::entry::CacheEntry;
use crate::eviction::{select_victim, AccessHistory, Candidates, EvictionPolicy};
use crate::order::AccessOrder;
use crate::size::EstimateSize;
use crate::stats::{CacheStats, EfficiencyReport, StatsRecorder};

/// Bounded, lock-protected in-memory cache
///
/// Every operation runs under a single mutex. Lock hold time is constant
/// except while an insert evicts, which scans the live entries once per
/// victim.
pub struct L1Cache<V> {
    config: L1Config,
    state: Mutex<State<V>>,
}

struct State<V> {
    entries: HashMap<String, CacheEntry<V>, RandomState>,
    order: AccessOrder<String>,
    history: HashMap<String, AccessHistory, RandomState>,
    total_size_bytes: u64,
    stats: StatsRecorder,
}

impl<V> State<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(RandomState::new()),
            order: AccessOrder::new(),
            history: HashMap::with_hasher(RandomState::new()),
            total_size_bytes: 0,
            stats: StatsRecorder::default(),
        }
    }

    fn insert(&mut self, entry: CacheEntry<V>) {
        self.total_size_bytes += entry.size_bytes as u64;
        self.order.touch(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        self.history.remove(key);
        self.total_size_bytes = self.total_size_bytes.saturating_sub(entry.size_bytes as u64);
        Some(entry)
    }

    fn evict_one(&mut self, policy: EvictionPolicy, now: Instant) -> Option<String> {
        let victim = {
            let candidates = Candidates {
                entries: &self.entries,
                history: &self.history,
                least_recent: self.order.oldest(),
            };
            select_victim(policy, &candidates, now)?
        };

        self.remove(&victim);
        self.stats.record_eviction();
        Some(victim)
    }

    fn is_expired(&self, key: &str, now: Instant) -> Option<bool> {
        self.entries.get(key).map(|entry| entry.is_expired_at(now))
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.total_size_bytes, self.entries.len() as u64)
    }
}

impl<V> L1Cache<V>
where
    V: Clone + EstimateSize,
{
    /// Create an empty cache
    pub fn new(config: L1Config) -> Self {
        Self {
            config,
            state: Mutex::new(State::new()),
        }
    }

    /// Get a value, removing it first if its TTL has elapsed
    pub fn get(&self, key: &str) -> Option<V> {
        let started = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.is_expired(key, started) {
            None => {
                state.stats.record_miss();
                return None;
            }
            Some(true) => {
                state.remove(key);
                state.stats.record_miss();
                trace!(key, "l1 entry expired on read");
                return None;
            }
            Some(false) => {}
        }

        let value = {
            let entry = state.entries.get_mut(key)?;
            entry.touch_at(started);
            entry.value.clone()
        };

        state.order.promote(key);
        match state.history.get_mut(key) {
            Some(history) => history.record(started),
            None => {
                let mut history = AccessHistory::default();
                history.record(started);
                state.history.insert(key.to_owned(), history);
            }
        }
        state.stats.record_hit(started.elapsed());

        Some(value)
    }

    /// Insert or replace a value
    ///
    /// `ttl` falls back to the configured default. Evicts until the new
    /// entry fits. Returns false without caching when `max_entries` is zero
    /// or the value alone exceeds `max_size_bytes`; in the latter case any
    /// previous value for the key is dropped.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        self.set_with_metadata(key, value, ttl, HashMap::new())
    }

    /// Insert or replace a value carrying metadata
    pub fn set_with_metadata(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
        metadata: HashMap<String, Value>,
    ) -> bool {
        let key = key.into();
        if self.config.max_entries == 0 {
            trace!(key = %key, "l1 disabled by max_entries = 0");
            return false;
        }

        let now = Instant::now();
        let entry = CacheEntry::new_at(key, value, ttl.or(self.config.default_ttl), now)
            .with_metadata(metadata);
        let new_size = entry.size_bytes as u64;

        let mut state = self.state.lock();

        // A replaced entry leaves without counting as an eviction, even when
        // the new value is then refused
        state.remove(&entry.key);

        if new_size > self.config.max_size_bytes {
            debug!(
                key = %entry.key,
                size_bytes = new_size,
                max_size_bytes = self.config.max_size_bytes,
                "value exceeds l1 capacity, not cached"
            );
            return false;
        }

        while state.entries.len() >= self.config.max_entries
            || state.total_size_bytes + new_size > self.config.max_size_bytes
        {
            match state.evict_one(self.config.eviction_policy, now) {
                Some(victim) => debug!(
                    key = %victim,
                    policy = %self.config.eviction_policy,
                    "evicted l1 entry"
                ),
                None => break,
            }
        }

        state.insert(entry);
        true
    }

    /// Remove a key; true if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Check for a live key without counting a hit or miss
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.is_expired(key, now) {
            Some(false) => true,
            Some(true) => {
                state.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.history.clear();
        state.total_size_bytes = 0;
        state.stats.reset();
        true
    }

    /// Remove every expired entry; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats()
    }

    /// Hot/cold distribution and memory utilization
    pub fn efficiency(&self) -> EfficiencyReport {
        let state = self.state.lock();
        let memory_utilization = if self.config.max_size_bytes == 0 {
            0.0
        } else {
            state.total_size_bytes as f64 / self.config.max_size_bytes as f64
        };

        if state.entries.is_empty() {
            return EfficiencyReport {
                memory_utilization,
                ..EfficiencyReport::default()
            };
        }

        let total_accesses: u64 = state.entries.values().map(|entry| entry.access_count).sum();
        let average = total_accesses as f64 / state.entries.len() as f64;
        let mut report = EfficiencyReport {
            average_access_count: average,
            memory_utilization,
            ..EfficiencyReport::default()
        };

        for entry in state.entries.values() {
            let count = entry.access_count as f64;
            if count > 1.5 * average {
                report.hot_entries += 1;
            } else if count < 0.5 * average {
                report.cold_entries += 1;
            }
        }
        report
    }

    /// Metadata of a live entry
    pub fn metadata(&self, key: &str) -> Option<HashMap<String, Value>> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.metadata.clone())
    }

    /// Keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored entries (expired ones count until discovered)
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Configuration the cache was built with
    pub fn config(&self) -> &L1Config {
        &self.config
    }
}
