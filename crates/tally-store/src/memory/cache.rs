//! In-memory key-value cache

use crate::cache::CacheStore;
use crate::error::StoreResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tally_common::CacheKey;

/// Cache call statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub gets: AtomicU64,
    pub multi_gets: AtomicU64,
    pub sets: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    /// Total round-trips made against the cache
    pub fn calls(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
            + self.multi_gets.load(Ordering::Relaxed)
            + self.sets.load(Ordering::Relaxed)
    }
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Key-value cache held in memory
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    stats: CacheStats,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without counting it as a call
    pub fn insert(&self, key: CacheKey, value: impl Into<String>) {
        self.entries.write().insert(
            key,
            CacheEntry {
                value: value.into(),
                expires_at: None,
            },
        );
    }

    /// Read an entry without counting it as a call
    pub fn peek(&self, key: &CacheKey) -> Option<String> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn lookup(&self, key: &CacheKey, now: Instant) -> Option<String> {
        let value = self
            .entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone());
        if value.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn multi_get(&self, keys: &[CacheKey]) -> StoreResult<HashMap<CacheKey, String>> {
        self.stats.multi_gets.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| self.lookup(key, now).map(|value| (key.clone(), value)))
            .collect())
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<String>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.lookup(key, Instant::now()))
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.write().insert(
            key.clone(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}
