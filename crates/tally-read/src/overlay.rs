//! Balance cache overlay
//!
//! Durable balance rows lag behind transactions still being applied; the
//! write path mirrors each in-flight balance into the cache. Reads replace
//! `available`, `on_hold` and `version` with that mirror when one exists.
//!
//! The cache is an optimization only. An unreachable cache yields durable
//! values for every balance, and a corrupt entry yields durable values for
//! that balance alone.

use crate::stats::ReadStats;
use std::collections::HashMap;
use std::sync::Arc;
use tally_common::{Balance, CacheKey, CachedBalance};
use tally_store::CacheStore;
use tracing::{debug, warn};

/// Outcome of overlaying one batch of balances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub applied: usize,
    pub missed: usize,
    pub corrupt: usize,
}

/// Overlay cached mirrors onto balances in place.
///
/// Only balances whose derived key is present in `cached` and holds a
/// valid payload are touched.
pub fn overlay_balances(
    balances: &mut [Balance],
    cached: &HashMap<CacheKey, String>,
) -> OverlayReport {
    let mut report = OverlayReport::default();

    for balance in balances.iter_mut() {
        let key = balance.cache_key();
        let Some(raw) = cached.get(&key) else {
            report.missed += 1;
            continue;
        };

        match serde_json::from_str::<CachedBalance>(raw) {
            Ok(mirror) => {
                balance.apply_cached(&mirror);
                report.applied += 1;
            }
            Err(e) => {
                warn!(
                    balance_id = %balance.id,
                    cache_key = %key,
                    error = %e,
                    "Corrupt cached balance, keeping durable values"
                );
                report.corrupt += 1;
            }
        }
    }

    report
}

/// Merges cache-resident balance mirrors into durable balance rows
pub struct BalanceOverlay {
    cache: Arc<dyn CacheStore>,
    stats: Arc<ReadStats>,
}

impl BalanceOverlay {
    pub fn new(cache: Arc<dyn CacheStore>, stats: Arc<ReadStats>) -> Self {
        Self { cache, stats }
    }

    /// Return `balances` with fresher cached values applied. Never fails.
    pub async fn apply(&self, mut balances: Vec<Balance>) -> Vec<Balance> {
        if balances.is_empty() {
            return balances;
        }

        let keys: Vec<CacheKey> = balances.iter().map(Balance::cache_key).collect();
        let cached = match self.cache.multi_get(&keys).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    balances = balances.len(),
                    error = %e,
                    "Balance cache unavailable, serving durable values"
                );
                ReadStats::add(&self.stats.degraded_overlays, 1);
                return balances;
            }
        };

        let report = overlay_balances(&mut balances, &cached);
        debug!(
            applied = report.applied,
            missed = report.missed,
            corrupt = report.corrupt,
            "Balance overlay complete"
        );
        ReadStats::add(&self.stats.cache_hits, report.applied as u64);
        ReadStats::add(&self.stats.cache_misses, report.missed as u64);
        ReadStats::add(&self.stats.corrupt_cache_entries, report.corrupt as u64);

        balances
    }
}
