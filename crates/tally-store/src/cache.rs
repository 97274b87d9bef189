//! Key-value cache port
//!
//! Holds in-flight balance mirrors and setting flags. Best-effort: callers
//! treat every failure as a miss.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tally_common::CacheKey;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch several keys in one round-trip. Missing keys are absent from the map.
    async fn multi_get(&self, keys: &[CacheKey]) -> StoreResult<HashMap<CacheKey, String>>;

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<String>>;

    /// Store a value; `None` means no expiration
    async fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> StoreResult<()>;
}
