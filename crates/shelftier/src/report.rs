//! Aggregated statistics report

use std::collections::HashMap;

use serde::Serialize;
use shelfcache::{CacheStats, EfficiencyReport};

use crate::error::StoreError;
use crate::stats::TierStatsSnapshot;

/// Everything [`MultiLevelCache::comprehensive_stats`](crate::MultiLevelCache::comprehensive_stats) knows
#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveStats {
    /// L1 counters
    pub l1: CacheStats,
    /// L1 hot/cold distribution
    pub l1_efficiency: EfficiencyReport,
    /// Best-effort L2 introspection
    pub l2: L2Report,
    /// Two-level counters
    pub tier: TierStatsSnapshot,
    /// Pending promotion bookkeeping
    pub promotion: PromotionReport,
    /// Warming registry and observed key patterns
    pub warming: WarmingSummary,
}

/// L2 state as reported by the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct L2Report {
    /// An L2 store is attached
    pub configured: bool,
    /// The store answered `info`
    pub available: bool,
    /// Key count, when the store reports one
    pub key_count: Option<u64>,
    /// Raw `info` fields
    pub info: HashMap<String, String>,
    /// Why the store could not be queried
    pub error: Option<String>,
}

impl L2Report {
    pub(crate) fn not_configured() -> Self {
        Self::default()
    }

    pub(crate) fn available(info: HashMap<String, String>) -> Self {
        Self {
            configured: true,
            available: true,
            key_count: key_count(&info),
            info,
            error: None,
        }
    }

    pub(crate) fn unavailable(err: &StoreError) -> Self {
        Self {
            configured: true,
            available: false,
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// `keys` field, or the sum of Redis `dbN:keys=..,expires=..` lines
fn key_count(info: &HashMap<String, String>) -> Option<u64> {
    if let Some(keys) = info.get("keys").and_then(|v| v.parse().ok()) {
        return Some(keys);
    }

    let mut total = None;
    for (name, value) in info {
        if !name.starts_with("db") {
            continue;
        }
        let keys = value
            .split(',')
            .find_map(|field| field.strip_prefix("keys="))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(keys) = keys {
            *total.get_or_insert(0) += keys;
        }
    }
    total
}

/// Promotion counters not yet at the threshold
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromotionReport {
    /// L2 hits needed for a promotion
    pub threshold: u32,
    /// Keys with a pending count
    pub tracked_keys: usize,
    /// Sum of pending counts
    pub pending_hits: u64,
}

/// One warming signature and how often it was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureCount {
    /// `first_last` token pattern
    pub signature: String,
    /// Writes observed
    pub count: u64,
}

/// Warming registry and the most written key patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmingSummary {
    /// Registered pattern names
    pub registered_patterns: Vec<String>,
    /// Pattern tasks running now
    pub in_flight: usize,
    /// Most frequent signatures, most written first
    pub top_signatures: Vec<SignatureCount>,
}
