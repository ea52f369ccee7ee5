//! # shelfcache
//!
//! Bounded in-process (L1) cache for the recommendation platform.
//!
//! ## Architecture
//! - **Entries**: value + timestamps, TTL, access count and size estimate
//! - **Access order**: index-linked list for O(1) LRU bookkeeping
//! - **Eviction**: LRU, LFU, TTL or an adaptive weighted score
//! - **Expiry**: lazy, on the read that discovers it
//!
//! All state of one [`L1Cache`] sits behind one mutex, so operations on a
//! single instance are linearizable.

#![warn(missing_docs)]

mod config;
mod entry;
mod eviction;
mod l1;
mod order;
mod size;
mod stats;

pub use config::L1Config;
pub use entry::CacheEntry;
pub use eviction::{
    adaptive_score, select_victim, AccessHistory, Candidates, EvictionPolicy, ParsePolicyError,
    HISTORY_LEN,
};
pub use l1::L1Cache;
pub use order::AccessOrder;
pub use size::{estimate_serialized, EstimateSize, FALLBACK_SIZE_BYTES};
pub use stats::{hit_rate, moving_average, CacheStats, EfficiencyReport, ACCESS_TIME_ALPHA};
