//! Eviction policies and victim selection
//!
//! Victim selection is a pure function of the policy, the live entries, the
//! recency order and the per-key access history. Ties always go to the
//! lexicographically smallest key so eviction is reproducible.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::BuildHasher;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

/// Number of access timestamps kept per key
pub const HISTORY_LEN: usize = 10;

const RECENCY_WEIGHT: f64 = 0.4;
const FREQUENCY_WEIGHT: f64 = 0.3;
const SIZE_WEIGHT: f64 = 0.2;
const TREND_WEIGHT: f64 = 0.1;

/// Floor for the gap between two accesses when computing rates
const MIN_INTERVAL_SECS: f64 = 1e-3;

/// Rule used to pick the entry removed when the cache is full
///
/// Serialized as its lower-case name; parsing ignores case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// Oldest insertion
    Ttl,
    /// Weighted recency, frequency, size and access trend
    #[default]
    Adaptive,
}

impl EvictionPolicy {
    /// Lower-case policy name
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Ttl => "ttl",
            EvictionPolicy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EvictionPolicy> for &'static str {
    fn from(policy: EvictionPolicy) -> Self {
        policy.as_str()
    }
}

impl TryFrom<String> for EvictionPolicy {
    type Error = ParsePolicyError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

/// Unknown eviction policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown eviction policy `{0}` (expected lru, lfu, ttl or adaptive)")]
pub struct ParsePolicyError(pub String);

impl FromStr for EvictionPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "ttl" => Ok(EvictionPolicy::Ttl),
            "adaptive" => Ok(EvictionPolicy::Adaptive),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// The last few read-hit timestamps of one key
#[derive(Debug, Clone, Default)]
pub struct AccessHistory {
    stamps: VecDeque<Instant>,
}

impl AccessHistory {
    /// Record an access, dropping the oldest stamp beyond [`HISTORY_LEN`]
    pub fn record(&mut self, now: Instant) {
        if self.stamps.len() == HISTORY_LEN {
            self.stamps.pop_front();
        }
        self.stamps.push_back(now);
    }

    /// Number of recorded accesses
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Positive when access is slowing down, zero otherwise
    ///
    /// Compares the access rate (accesses per second) of the latest gap with
    /// that of the earliest gap, scaled by the number of samples:
    /// `max(0, -(latest_rate - earliest_rate) / n)`.
    pub fn negative_trend(&self) -> f64 {
        if self.stamps.len() < 3 {
            return 0.0;
        }

        let rate = |earlier: &Instant, later: &Instant| {
            1.0 / later
                .saturating_duration_since(*earlier)
                .as_secs_f64()
                .max(MIN_INTERVAL_SECS)
        };

        let n = self.stamps.len();
        let earliest = rate(&self.stamps[0], &self.stamps[1]);
        let latest = rate(&self.stamps[n - 2], &self.stamps[n - 1]);
        let trend = (latest - earliest) / n as f64;

        (-trend).max(0.0)
    }
}

/// Adaptive eviction score; the highest score is evicted first
pub fn adaptive_score<V>(entry: &CacheEntry<V>, history: Option<&AccessHistory>, now: Instant) -> f64 {
    let recency_hours = entry.idle_at(now).as_secs_f64() / 3600.0;
    let frequency = 1.0 / (entry.access_count as f64 + 1.0);
    let size_mb = entry.size_bytes as f64 / 1_000_000.0;
    let negative_trend = history.map(AccessHistory::negative_trend).unwrap_or(0.0);

    RECENCY_WEIGHT * recency_hours
        + FREQUENCY_WEIGHT * frequency
        + SIZE_WEIGHT * size_mb
        + TREND_WEIGHT * negative_trend
}

/// Everything victim selection looks at
pub struct Candidates<'a, V, S> {
    /// Live entries by key
    pub entries: &'a HashMap<String, CacheEntry<V>, S>,
    /// Access history by key
    pub history: &'a HashMap<String, AccessHistory, S>,
    /// Least recently used key, if any
    pub least_recent: Option<&'a String>,
}

/// Pick the key to evict, or `None` when there are no entries
pub fn select_victim<V, S>(policy: EvictionPolicy, candidates: &Candidates<'_, V, S>, now: Instant) -> Option<String>
where
    S: BuildHasher,
{
    let entries = candidates.entries;

    let victim = match policy {
        EvictionPolicy::Lru => candidates
            .least_recent
            .filter(|key| entries.contains_key(key.as_str()))
            .or_else(|| min_by_key(entries, |entry| entry.last_accessed)),
        EvictionPolicy::Lfu => min_by_key(entries, |entry| entry.access_count),
        EvictionPolicy::Ttl => min_by_key(entries, |entry| entry.created_at),
        EvictionPolicy::Adaptive => {
            let mut best: Option<(&String, f64)> = None;
            for (key, entry) in entries {
                let score = adaptive_score(entry, candidates.history.get(key), now);
                best = match best {
                    Some((best_key, best_score))
                        if best_score > score || (best_score == score && best_key < key) =>
                    {
                        Some((best_key, best_score))
                    }
                    _ => Some((key, score)),
                };
            }
            best.map(|(key, _)| key)
        }
    };

    victim.cloned()
}

fn min_by_key<'a, V, S, T, F>(entries: &'a HashMap<String, CacheEntry<V>, S>, f: F) -> Option<&'a String>
where
    T: Ord,
    F: Fn(&CacheEntry<V>) -> T,
{
    entries
        .iter()
        .min_by(|(ka, a), (kb, b)| f(*a).cmp(&f(*b)).then_with(|| ka.cmp(kb)))
        .map(|(key, _)| key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::RandomState;
    use std::time::Duration;

    type Map<T> = HashMap<String, T, RandomState>;

    fn entry(key: &str, size: usize, now: Instant) -> CacheEntry<Vec<u8>> {
        CacheEntry::new_at(key, vec![0u8; size], None, now)
    }

    fn pick(policy: EvictionPolicy, entries: &Map<CacheEntry<Vec<u8>>>, now: Instant) -> Option<String> {
        let history = Map::default();
        let candidates = Candidates {
            entries,
            history: &history,
            least_recent: None,
        };
        select_victim(policy, &candidates, now)
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("LRU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!(" lfu ".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert_eq!("Adaptive".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Adaptive);
        assert!("random".parse::<EvictionPolicy>().is_err());
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Adaptive);
    }

    #[test]
    fn test_policy_serde_ignores_case() {
        let policy: EvictionPolicy = serde_json::from_str(r#""TTL""#).unwrap();
        assert_eq!(policy, EvictionPolicy::Ttl);
        assert_eq!(serde_json::to_string(&EvictionPolicy::Lfu).unwrap(), r#""lfu""#);
        assert!(serde_json::from_str::<EvictionPolicy>(r#""mru""#).is_err());
    }

    #[test]
    fn test_empty_has_no_victim() {
        let entries = Map::default();
        assert_eq!(pick(EvictionPolicy::Adaptive, &entries, Instant::now()), None);
    }

    #[test]
    fn test_lfu_picks_least_accessed() {
        let now = Instant::now();
        let mut entries = Map::default();
        let mut hot = entry("hot", 10, now);
        hot.access_count = 5;
        let mut cold = entry("cold", 10, now);
        cold.access_count = 1;
        entries.insert("hot".into(), hot);
        entries.insert("cold".into(), cold);

        assert_eq!(pick(EvictionPolicy::Lfu, &entries, now).as_deref(), Some("cold"));
    }

    #[test]
    fn test_ttl_picks_oldest_insert() {
        let now = Instant::now();
        let mut entries = Map::default();
        entries.insert("old".into(), entry("old", 10, now));
        entries.insert("new".into(), entry("new", 10, now + Duration::from_secs(1)));

        let later = now + Duration::from_secs(2);
        assert_eq!(pick(EvictionPolicy::Ttl, &entries, later).as_deref(), Some("old"));
    }

    #[test]
    fn test_lru_uses_recency_order() {
        let now = Instant::now();
        let mut entries = Map::default();
        entries.insert("a".into(), entry("a", 10, now));
        entries.insert("b".into(), entry("b", 10, now));
        let history = Map::default();
        let least_recent = String::from("b");
        let candidates = Candidates {
            entries: &entries,
            history: &history,
            least_recent: Some(&least_recent),
        };

        assert_eq!(select_victim(EvictionPolicy::Lru, &candidates, now).as_deref(), Some("b"));
    }

    #[test]
    fn test_ties_go_to_smallest_key() {
        let now = Instant::now();
        let mut entries = Map::default();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            entries.insert(key.into(), entry(key, 10, now));
        }

        for policy in [EvictionPolicy::Lfu, EvictionPolicy::Ttl, EvictionPolicy::Adaptive] {
            assert_eq!(pick(policy, &entries, now).as_deref(), Some("alpha"), "{policy}");
        }
    }

    #[test]
    fn test_adaptive_prefers_idle_entries() {
        let now = Instant::now();
        let later = now + Duration::from_secs(7200);
        let mut entries = Map::default();
        entries.insert("idle".into(), entry("idle", 10, now));
        let mut fresh = entry("fresh", 10, now);
        fresh.touch_at(later);
        entries.insert("fresh".into(), fresh);

        assert_eq!(pick(EvictionPolicy::Adaptive, &entries, later).as_deref(), Some("idle"));
    }

    #[test]
    fn test_adaptive_prefers_large_entries() {
        let now = Instant::now();
        let mut entries = Map::default();
        entries.insert("small".into(), entry("small", 10, now));
        entries.insert("large".into(), entry("large", 5_000_000, now));

        assert_eq!(pick(EvictionPolicy::Adaptive, &entries, now).as_deref(), Some("large"));
    }

    #[test]
    fn test_adaptive_score_formula() {
        let now = Instant::now();
        let mut e = entry("k", 2_000_000, now);
        e.access_count = 1;
        let later = now + Duration::from_secs(3600);

        // 0.4 * 1h + 0.3 * 1/2 + 0.2 * 2MB
        let expected = 0.4 + 0.15 + 0.4;
        assert!((adaptive_score(&e, None, later) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let now = Instant::now();
        let mut history = AccessHistory::default();
        for i in 0..25 {
            history.record(now + Duration::from_secs(i));
        }
        assert_eq!(history.len(), HISTORY_LEN);
    }

    #[test]
    fn test_negative_trend_decelerating() {
        let now = Instant::now();
        let mut history = AccessHistory::default();
        // gaps of 1s then 10s: rate drops from 1.0 to 0.1
        history.record(now);
        history.record(now + Duration::from_secs(1));
        history.record(now + Duration::from_secs(11));

        let expected = (1.0 - 0.1) / 3.0;
        assert!((history.negative_trend() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_negative_trend_accelerating_is_zero() {
        let now = Instant::now();
        let mut history = AccessHistory::default();
        history.record(now);
        history.record(now + Duration::from_secs(10));
        history.record(now + Duration::from_secs(11));

        assert_eq!(history.negative_trend(), 0.0);
    }

    #[test]
    fn test_negative_trend_needs_three_samples() {
        let now = Instant::now();
        let mut history = AccessHistory::default();
        history.record(now);
        history.record(now + Duration::from_secs(10));

        assert_eq!(history.negative_trend(), 0.0);
    }
}
