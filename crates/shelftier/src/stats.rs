//! Multi-level cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use shelfcache::{hit_rate, moving_average};

use crate::error::ErrorKind;

/// Lock-free counters shared by every clone of a multi-level cache
#[derive(Debug, Default)]
pub struct TierStats {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    fallback_computations: AtomicU64,
    promotions: AtomicU64,
    sets: AtomicU64,
    failed_sets: AtomicU64,
    backing_store_errors: AtomicU64,
    fallback_errors: AtomicU64,
    codec_errors: AtomicU64,
    /// f64 bits of the latency moving average, in seconds
    average_latency_bits: AtomicU64,
}

/// Point-in-time copy of [`TierStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStatsSnapshot {
    /// Lookups served by L1
    pub l1_hits: u64,
    /// Lookups served by L2
    pub l2_hits: u64,
    /// Lookups that missed both levels
    pub misses: u64,
    /// Misses answered by a fallback
    pub fallback_computations: u64,
    /// L2 values copied into L1
    pub promotions: u64,
    /// Successful two-level writes
    pub sets: u64,
    /// Writes where at least one level failed
    pub failed_sets: u64,
    /// Recovered L2 failures
    pub backing_store_errors: u64,
    /// Recovered fallback failures
    pub fallback_errors: u64,
    /// Undecodable L2 payloads
    pub codec_errors: u64,
    /// `(l1_hits + l2_hits) / lookups`
    pub hit_rate: f64,
    /// Moving average of lookup latency in seconds
    pub average_latency: f64,
}

impl TierStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup served by L1
    pub fn record_l1_hit(&self, elapsed: Duration) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Record a lookup served by L2
    pub fn record_l2_hit(&self, elapsed: Duration) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Record a lookup that missed both levels
    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    /// Record a miss answered by a fallback
    pub fn record_fallback(&self) {
        self.fallback_computations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a promotion into L1
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a two-level write
    pub fn record_set(&self, ok: bool) {
        if ok {
            self.sets.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_sets.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a recovered error
    pub fn record_error(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::BackingStore => &self.backing_store_errors,
            ErrorKind::Fallback => &self.fallback_errors,
            ErrorKind::Codec => &self.codec_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn snapshot(&self) -> TierStatsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        TierStatsSnapshot {
            l1_hits,
            l2_hits,
            misses,
            fallback_computations: self.fallback_computations.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            failed_sets: self.failed_sets.load(Ordering::Relaxed),
            backing_store_errors: self.backing_store_errors.load(Ordering::Relaxed),
            fallback_errors: self.fallback_errors.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            hit_rate: hit_rate(l1_hits + l2_hits, misses),
            average_latency: f64::from_bits(self.average_latency_bits.load(Ordering::Relaxed)),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.l1_hits,
            &self.l2_hits,
            &self.misses,
            &self.fallback_computations,
            &self.promotions,
            &self.sets,
            &self.failed_sets,
            &self.backing_store_errors,
            &self.fallback_errors,
            &self.codec_errors,
            &self.average_latency_bits,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64();
        // The closure always returns Some, so this cannot fail
        let _ = self
            .average_latency_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some(moving_average(f64::from_bits(bits), sample).to_bits())
            });
    }
}
