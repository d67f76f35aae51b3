//! Short-lived, process-local cache of recent price readings.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub price: f64,
    pub raw_price: Option<String>,
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return true;
        };
        now - self.cached_at < ttl
    }
}

type CacheKey = (String, String, String);

/// Keyed by the exact (product, store, url) triple.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

fn key(product_id: &str, store: &str, url: &str) -> CacheKey {
    (product_id.to_string(), store.to_string(), url.to_string())
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh entry for the key, evicting it if it has expired.
    pub fn get(&self, product_id: &str, store: &str, url: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut entries = self.lock();
        let k = key(product_id, store, url);
        match entries.get(&k) {
            Some(entry) if entry.is_fresh(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(&k);
                None
            }
            None => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &self,
        product_id: &str,
        store: &str,
        url: &str,
        price: f64,
        raw_price: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        self.lock().insert(
            key(product_id, store, url),
            CacheEntry {
                price,
                raw_price,
                cached_at: now,
                ttl,
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn clear_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
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
}
