//! Cache statistics tracking

use std::time::Duration;

use serde::Serialize;

/// Smoothing factor of the access-time moving average
pub const ACCESS_TIME_ALPHA: f64 = 0.1;

/// Point-in-time statistics of an [`L1Cache`](crate::L1Cache)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Read hits
    pub hits: u64,
    /// Read misses, including reads that found an expired entry
    pub misses: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Sum of live entry sizes
    pub total_size_bytes: u64,
    /// Number of live entries
    pub entry_count: u64,
    /// `hits / (hits + misses)`, 0 without requests
    pub hit_rate: f64,
    /// Moving average of hit latency in seconds
    pub average_access_time: f64,
}

impl CacheStats {
    /// Total number of reads
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }
}

/// How well the cache's memory is being used
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EfficiencyReport {
    /// Entries read more than 1.5x the average access count
    pub hot_entries: usize,
    /// Entries read less than 0.5x the average access count
    pub cold_entries: usize,
    /// Mean access count over live entries
    pub average_access_count: f64,
    /// `total_size_bytes / max_size_bytes`
    pub memory_utilization: f64,
}

/// Calculate hit ratio (0.0 to 1.0)
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Fold one sample into an exponential moving average
pub fn moving_average(current: f64, sample: f64) -> f64 {
    ACCESS_TIME_ALPHA * sample + (1.0 - ACCESS_TIME_ALPHA) * current
}

/// Mutable counters owned by a cache and guarded by its lock
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: u64,
    misses: u64,
    evictions: u64,
    average_access_time: f64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&mut self, elapsed: Duration) {
        self.hits += 1;
        self.average_access_time = moving_average(self.average_access_time, elapsed.as_secs_f64());
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn snapshot(&self, total_size_bytes: u64, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            total_size_bytes,
            entry_count,
            hit_rate: hit_rate(self.hits, self.misses),
            average_access_time: self.average_access_time,
        }
    }
}
