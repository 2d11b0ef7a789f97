//! In-memory price cache with an explicit TTL.
//!
//! Owned by a `PriceDataProvider`; never shared through module state.
//! Entries are keyed by asset id, so two tokens sharing a display code never
//! share a series.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::price::{PriceSeries, PriceWindow};

#[derive(Debug, Clone)]
struct CacheEntry {
    series: PriceSeries,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub struct PriceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

impl PriceCache {
    pub fn new(ttl_secs: i64) -> Self {
        PriceCache {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.max(0)),
        }
    }

    fn key(asset_id: &str, counter_asset: &str, window: &PriceWindow) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            asset_id, counter_asset, window.start, window.end, window.resolution
        )
    }

    pub fn get(
        &self,
        asset_id: &str,
        counter_asset: &str,
        window: &PriceWindow,
    ) -> Option<PriceSeries> {
        let key = Self::key(asset_id, counter_asset, window);
        let entries = self.entries.read().ok()?;
        let now = Utc::now();
        entries
            .get(&key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.series.clone())
    }

    pub fn insert(
        &self,
        asset_id: &str,
        counter_asset: &str,
        window: &PriceWindow,
        series: PriceSeries,
    ) {
        if self.ttl <= Duration::zero() {
            return;
        }
        let key = Self::key(asset_id, counter_asset, window);
        let entry = CacheEntry {
            series,
            expires_at: Utc::now() + self.ttl,
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, entry);
        }
    }

    /// Drops every cached window for `asset_id`.
    pub fn invalidate(&self, asset_id: &str) {
        let prefix = format!("{}:", asset_id);
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|k, _| !k.starts_with(&prefix));
        }
    }

    pub fn clear_expired(&self) {
        let now = Utc::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| !entry.is_expired(now));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let (total, expired) = self
            .entries
            .read()
            .map(|entries| {
                let expired = entries.values().filter(|e| e.is_expired(now)).count();
                (entries.len(), expired)
            })
            .unwrap_or((0, 0));
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}
