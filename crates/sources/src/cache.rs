//! Keyed TTL cache.
//!
//! Entries are replaced wholesale on write and never mutated in place.
//! The lock is never held across an await point.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One cached record with its freshness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            cached_at,
            expires_at: cached_at + ttl,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Point-in-time view of a cache for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub entries: usize,
    pub valid_entries: usize,
    pub ttl_secs: i64,
    pub keys: Vec<String>,
}

pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Unexpired entry for `key`, if any.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<T>> {
        self.lock().get(key).filter(|e| e.is_valid(now)).cloned()
    }

    pub fn insert(&self, key: String, data: T, now: DateTime<Utc>) -> CacheEntry<T> {
        let entry = CacheEntry::new(data, now, self.ttl);
        self.lock().insert(key, entry.clone());
        entry
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn status(&self, now: DateTime<Utc>) -> CacheStatus {
        let entries = self.lock();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStatus {
            entries: entries.len(),
            valid_entries: entries.values().filter(|e| e.is_valid(now)).count(),
            ttl_secs: self.ttl.num_seconds(),
            keys,
        }
    }
}

impl<T: Clone + Serialize> TtlCache<T> {
    /// Serialize every unexpired entry.
    pub fn export(&self, now: DateTime<Utc>) -> serde_json::Result<String> {
        let live: HashMap<String, CacheEntry<T>> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.is_valid(now))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        serde_json::to_string(&live)
    }
}

impl<T: Clone + DeserializeOwned> TtlCache<T> {
    /// Load entries produced by [`TtlCache::export`]. Expired entries are dropped;
    /// imported entries keep their original `expires_at`. Returns how many were kept.
    pub fn import(&self, json: &str, now: DateTime<Utc>) -> serde_json::Result<usize> {
        let loaded: HashMap<String, CacheEntry<T>> = serde_json::from_str(json)?;
        let mut entries = self.lock();
        let mut kept = 0;
        for (key, entry) in loaded {
            if entry.is_valid(now) {
                entries.insert(key, entry);
                kept += 1;
            }
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_boundary() {
        let t0 = Utc::now();
        let entry = CacheEntry::new(1u32, t0, Duration::minutes(10));
        assert!(entry.is_valid(t0));
        assert!(entry.is_valid(t0 + Duration::minutes(10) - Duration::milliseconds(1)));
        assert!(!entry.is_valid(t0 + Duration::minutes(10)));
    }

    #[test]
    fn test_get_ignores_expired() {
        let t0 = Utc::now();
        let cache = TtlCache::new(Duration::minutes(1));
        cache.insert("k".to_string(), "v".to_string(), t0);
        assert!(cache.get("k", t0).is_some());
        assert!(cache.get("k", t0 + Duration::minutes(2)).is_none());
        // Still counted until replaced or cleared.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let t0 = Utc::now();
        let cache = TtlCache::new(Duration::minutes(1));
        cache.insert("a".to_string(), 1, t0);
        cache.insert("b".to_string(), 2, t0);
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_status_counts_valid_entries() {
        let t0 = Utc::now();
        let cache = TtlCache::new(Duration::minutes(5));
        cache.insert("old".to_string(), 1, t0 - Duration::minutes(6));
        cache.insert("new".to_string(), 2, t0);
        let status = cache.status(t0);
        assert_eq!(status.entries, 2);
        assert_eq!(status.valid_entries, 1);
        assert_eq!(status.ttl_secs, 300);
        assert_eq!(status.keys, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_export_skips_expired_and_import_keeps_expiry() {
        let t0 = Utc::now();
        let cache = TtlCache::new(Duration::minutes(5));
        cache.insert("stale".to_string(), 1, t0 - Duration::minutes(10));
        let fresh = cache.insert("fresh".to_string(), 2, t0);

        let json = cache.export(t0).unwrap();
        let other: TtlCache<i32> = TtlCache::new(Duration::minutes(60));
        assert_eq!(other.import(&json, t0).unwrap(), 1);
        assert_eq!(other.get("fresh", t0), Some(fresh));
        assert!(other.get("stale", t0).is_none());
    }

    #[test]
    fn test_import_rejects_garbage() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::minutes(5));
        assert!(cache.import("not json", Utc::now()).is_err());
    }
}
