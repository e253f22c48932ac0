//! Time-boxed, size-bounded in-memory store for completed batch results.

use std::collections::HashMap;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{CheckResult, VersionResult};

/// How long a cached batch stays servable.
pub const CACHE_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Upper bound on the "recent scans" MRU index.
const MAX_RECENT_KEYS: usize = 32;

struct CacheEntry {
    results: Vec<CheckResult>,
    scanned_at: OffsetDateTime,
    expires_at: OffsetDateTime,
    hidden: bool,
}

#[derive(Default)]
struct CacheInner {
    data: HashMap<String, CacheEntry>,
    /// MRU key list, most recent last, no duplicates. Presentation only;
    /// lookups never depend on it.
    recent_keys: Vec<String>,
}

/// Process-memory cache of batch results keyed by the requested target list.
///
/// Entries are created on first miss, silently superseded on re-scan after
/// expiry, and purged lazily on every write sweep. Lost on restart by
/// design.
#[derive(Default)]
pub struct ResultCache {
    inner: RwLock<CacheInner>,
}

/// One per-host line for the "recent scans" display.
#[derive(Debug, Clone)]
pub struct RecentSnapshot {
    pub target: String,
    pub url: String,
    pub port: Option<u16>,
    pub results: Vec<VersionResult>,
    pub scanned_at: OffsetDateTime,
    pub score: Option<u8>,
    pub grade: Option<String>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a target list: lower-cased, trimmed, comma-joined,
    /// order-preserving.
    pub fn cache_key(targets: &[String]) -> String {
        targets
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Return the cached results and scan timestamp iff a live entry exists.
    pub async fn get(&self, key: &str) -> Option<(Vec<CheckResult>, OffsetDateTime)> {
        let now = OffsetDateTime::now_utc();
        let inner = self.inner.read().await;
        let entry = inner.data.get(key)?;
        if entry.expires_at < now {
            return None;
        }
        Some((entry.results.clone(), entry.scanned_at))
    }

    /// Write/overwrite an entry with a fresh expiry and sweep out all
    /// expired entries while holding the write lock.
    pub async fn set(&self, key: &str, results: Vec<CheckResult>, include_in_recent: bool) {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.write().await;

        let before = inner.data.len();
        inner.data.retain(|_, entry| entry.expires_at >= now);
        let swept = before - inner.data.len();
        if swept > 0 {
            debug!(swept, "evicted expired cache entries");
        }

        inner.data.insert(
            key.to_string(),
            CacheEntry {
                results,
                scanned_at: now,
                expires_at: now + CACHE_TTL,
                hidden: !include_in_recent,
            },
        );

        if include_in_recent {
            // Move-to-end MRU update, then cap to the newest keys.
            inner.recent_keys.retain(|existing| existing != key);
            inner.recent_keys.push(key.to_string());
            if inner.recent_keys.len() > MAX_RECENT_KEYS {
                let drop = inner.recent_keys.len() - MAX_RECENT_KEYS;
                inner.recent_keys.drain(..drop);
            }
        }
    }

    /// Walk the MRU index from most- to least-recent, skipping expired or
    /// hidden entries and flattening each entry into per-host snapshots,
    /// until `limit` is reached.
    pub async fn recent_snapshots(&self, limit: usize) -> Vec<RecentSnapshot> {
        if limit == 0 {
            return Vec::new();
        }
        let now = OffsetDateTime::now_utc();
        let inner = self.inner.read().await;

        let mut snapshots = Vec::new();
        'keys: for key in inner.recent_keys.iter().rev() {
            let Some(entry) = inner.data.get(key) else { continue };
            if entry.expires_at < now || entry.hidden {
                continue;
            }
            for result in &entry.results {
                snapshots.push(RecentSnapshot {
                    target: result.target.clone(),
                    url: result.url.clone(),
                    port: result.port,
                    results: result.results.clone(),
                    scanned_at: entry.scanned_at,
                    score: result.score,
                    grade: result.grade.clone(),
                });
                if snapshots.len() >= limit {
                    break 'keys;
                }
            }
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_for(target: &str, grade: &str, score: u8) -> CheckResult {
        let mut res = CheckResult::invalid(target, String::new());
        res.port = Some(443);
        res.url = format!("https://{target}:443");
        res.results = vec![VersionResult::new("HTTP/2.0")];
        res.score = Some(score);
        res.grade = Some(grade.to_string());
        res
    }

    #[test]
    fn key_is_lowercased_trimmed_order_preserving() {
        let key = ResultCache::cache_key(&[" A.com ".to_string(), "b.COM".to_string()]);
        assert_eq!(key, "a.com,b.com");
        let reversed = ResultCache::cache_key(&["b.COM".to_string(), " A.com ".to_string()]);
        assert_ne!(key, reversed);
    }

    #[tokio::test]
    async fn get_roundtrip_within_ttl() {
        let cache = ResultCache::new();
        let results = vec![result_for("a.com", "A", 95)];
        cache.set("a.com", results.clone(), true).await;
        let (cached, _at) = cache.get("a.com").await.unwrap();
        assert_eq!(cached, results);
        assert!(cache.get("other.com").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_never_returned() {
        let cache = ResultCache::new();
        cache.set("a.com", vec![result_for("a.com", "A", 95)], true).await;
        {
            let mut inner = cache.inner.write().await;
            let entry = inner.data.get_mut("a.com").unwrap();
            entry.expires_at = OffsetDateTime::now_utc() - Duration::from_secs(1);
        }
        assert!(cache.get("a.com").await.is_none());
        assert!(cache.recent_snapshots(10).await.is_empty());
    }

    #[tokio::test]
    async fn write_sweeps_expired_entries() {
        let cache = ResultCache::new();
        cache.set("old.com", vec![result_for("old.com", "F", 40)], true).await;
        {
            let mut inner = cache.inner.write().await;
            let entry = inner.data.get_mut("old.com").unwrap();
            entry.expires_at = OffsetDateTime::now_utc() - Duration::from_secs(1);
        }
        cache.set("new.com", vec![result_for("new.com", "A", 95)], true).await;
        let inner = cache.inner.read().await;
        assert!(!inner.data.contains_key("old.com"));
        assert!(inner.data.contains_key("new.com"));
    }

    #[tokio::test]
    async fn hidden_entries_are_cached_but_not_recent() {
        let cache = ResultCache::new();
        cache.set("secret.com", vec![result_for("secret.com", "B", 90)], false).await;
        assert!(cache.get("secret.com").await.is_some());
        assert!(cache.recent_snapshots(10).await.is_empty());
    }

    #[tokio::test]
    async fn recent_index_dedupes_and_orders_most_recent_first() {
        let cache = ResultCache::new();
        cache.set("a.com", vec![result_for("a.com", "A", 95)], true).await;
        cache.set("b.com", vec![result_for("b.com", "B", 90)], true).await;
        cache.set("a.com", vec![result_for("a.com", "A", 95)], true).await;

        let snapshots = cache.recent_snapshots(10).await;
        let targets: Vec<_> = snapshots.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, vec!["a.com", "b.com"]);
    }

    #[tokio::test]
    async fn recent_index_caps_at_32_keys() {
        let cache = ResultCache::new();
        for i in 0..40 {
            let target = format!("host{i}.com");
            cache.set(&target, vec![result_for(&target, "C", 80)], true).await;
        }
        let inner = cache.inner.read().await;
        assert_eq!(inner.recent_keys.len(), 32);
        // Oldest keys were dropped.
        assert_eq!(inner.recent_keys.first().unwrap(), "host8.com");
        assert_eq!(inner.recent_keys.last().unwrap(), "host39.com");
    }

    #[tokio::test]
    async fn snapshots_flatten_multi_target_entries_up_to_limit() {
        let cache = ResultCache::new();
        cache
            .set(
                "a.com,b.com",
                vec![result_for("a.com", "A", 95), result_for("b.com", "F", 40)],
                true,
            )
            .await;
        let snapshots = cache.recent_snapshots(1).await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].target, "a.com");
    }
}
