//! Cache-aside access to per-ledger settings
//!
//! Settings are boolean flags. Reads go to the cache first and fall back
//! to the relational store; a key missing from both means "inactive".
//! Whatever was resolved is written back to the cache without expiry so the
//! next read is served from it.
//!
//! The returned identity is only stable when the durable record was read.
//! Cache hits and defaults carry a freshly generated id.

use std::sync::Arc;
use tally_common::{CacheKey, Result, Setting};
use tally_store::{CacheStore, SettingRepository};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct SettingsAccessor {
    settings: Arc<dyn SettingRepository>,
    cache: Arc<dyn CacheStore>,
}

const fn flag(active: bool) -> &'static str {
    if active { "true" } else { "false" }
}

impl SettingsAccessor {
    pub fn new(settings: Arc<dyn SettingRepository>, cache: Arc<dyn CacheStore>) -> Self {
        Self { settings, cache }
    }

    /// Resolve a setting, caching the result.
    ///
    /// Only relational errors other than "not found" fail the call; cache
    /// errors are logged and skipped.
    pub async fn get_or_create(&self, organization_id: Uuid, ledger_id: Uuid, key: &str) -> Result<Setting> {
        let cache_key = CacheKey::setting(organization_id, ledger_id, key);

        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => match raw.parse::<bool>() {
                Ok(active) => {
                    debug!(%cache_key, active, "Setting served from cache");
                    return Ok(Setting::synthesized(organization_id, ledger_id, key, active));
                }
                Err(e) => {
                    warn!(%cache_key, value = %raw, error = %e, "Corrupt cached setting, reading durable value");
                }
            },
            Ok(None) => debug!(%cache_key, "Setting not cached"),
            Err(e) => warn!(%cache_key, error = %e, "Setting cache unavailable, reading durable value"),
        }

        let setting = match self.settings.find_setting(organization_id, ledger_id, key).await {
            Ok(setting) => setting,
            Err(e) if e.is_not_found() => {
                debug!(%cache_key, "Setting not defined, defaulting to inactive");
                Setting::synthesized(organization_id, ledger_id, key, false)
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.cache.set(&cache_key, flag(setting.active), None).await {
            warn!(%cache_key, error = %e, "Failed to cache setting");
        }

        Ok(setting)
    }
}
