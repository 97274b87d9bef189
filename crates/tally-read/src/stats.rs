//! Read-path statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for reconciliation outcomes
#[derive(Debug, Default)]
pub struct ReadStats {
    /// Balances overlaid with a cached mirror
    pub cache_hits: AtomicU64,
    /// Balances served with durable values for lack of a cached mirror
    pub cache_misses: AtomicU64,
    /// Cached mirrors that failed to deserialize
    pub corrupt_cache_entries: AtomicU64,
    /// Overlays skipped entirely because the cache was unreachable
    pub degraded_overlays: AtomicU64,
    /// Operation fetches issued by the poller
    pub poll_attempts: AtomicU64,
    /// Polls that exhausted their deadline
    pub poll_timeouts: AtomicU64,
    /// Entities whose metadata came from the original request body
    pub fallback_fills: AtomicU64,
}

/// Point-in-time copy of [`ReadStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub corrupt_cache_entries: u64,
    pub degraded_overlays: u64,
    pub poll_attempts: u64,
    pub poll_timeouts: u64,
    pub fallback_fills: u64,
}

impl ReadStats {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            corrupt_cache_entries: self.corrupt_cache_entries.load(Ordering::Relaxed),
            degraded_overlays: self.degraded_overlays.load(Ordering::Relaxed),
            poll_attempts: self.poll_attempts.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            fallback_fills: self.fallback_fills.load(Ordering::Relaxed),
        }
    }
}
