//! Store adapters that fail wholly or partially, for exercising degraded paths

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tally_common::{
    CacheKey, EntityType, Metadata, MetadataDocument, MetadataFilter, OutboxEntry,
};
use tally_store::{CacheStore, MetadataStore, OutboxLookup, OutboxStore, StoreError, StoreResult};

#[derive(Default)]
pub struct UnavailableCache {
    pub calls: AtomicU64,
}

impl UnavailableCache {
    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::backend("cache unreachable"))
    }
}

#[async_trait]
impl CacheStore for UnavailableCache {
    async fn multi_get(&self, _keys: &[CacheKey]) -> StoreResult<HashMap<CacheKey, String>> {
        self.fail()
    }

    async fn get(&self, _key: &CacheKey) -> StoreResult<Option<String>> {
        self.fail()
    }

    async fn set(&self, _key: &CacheKey, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        self.fail()
    }
}

pub struct UnavailableMetadata;

#[async_trait]
impl MetadataStore for UnavailableMetadata {
    async fn find_by_entity(
        &self,
        _entity_type: EntityType,
        _entity_id: &str,
    ) -> StoreResult<Option<MetadataDocument>> {
        Err(StoreError::backend("document store unreachable"))
    }

    async fn find_by_entity_ids(
        &self,
        _entity_type: EntityType,
        _entity_ids: &[String],
    ) -> StoreResult<Vec<MetadataDocument>> {
        Err(StoreError::backend("document store unreachable"))
    }

    async fn find_by_predicate(
        &self,
        _entity_type: EntityType,
        _filter: &MetadataFilter,
    ) -> StoreResult<Vec<MetadataDocument>> {
        Err(StoreError::backend("document store unreachable"))
    }
}

pub struct UnavailableOutbox;

#[async_trait]
impl OutboxStore for UnavailableOutbox {
    async fn find_by_entity_id(
        &self,
        _entity_id: &str,
        _entity_type: EntityType,
    ) -> StoreResult<Option<OutboxEntry>> {
        Err(StoreError::backend("outbox unreachable"))
    }

    async fn find_metadata_by_entity_ids(
        &self,
        _entity_ids: &[String],
        _entity_type: EntityType,
    ) -> StoreResult<OutboxLookup> {
        Err(StoreError::backend("outbox unreachable"))
    }
}

/// Outbox where some entries resolve and others are unreadable
#[derive(Default)]
pub struct PartialOutbox {
    readable: HashMap<String, Metadata>,
    unreadable: Vec<String>,
}

impl PartialOutbox {
    pub fn readable(mut self, entity_id: impl Into<String>, metadata: Metadata) -> Self {
        self.readable.insert(entity_id.into(), metadata);
        self
    }

    pub fn unreadable(mut self, entity_id: impl Into<String>) -> Self {
        self.unreadable.push(entity_id.into());
        self
    }
}

#[async_trait]
impl OutboxStore for PartialOutbox {
    async fn find_by_entity_id(
        &self,
        entity_id: &str,
        entity_type: EntityType,
    ) -> StoreResult<Option<OutboxEntry>> {
        if self.unreadable.iter().any(|id| id == entity_id) {
            return Err(StoreError::backend("corrupt outbox entry"));
        }
        Ok(self
            .readable
            .get(entity_id)
            .map(|metadata| OutboxEntry::pending(entity_type, entity_id, metadata.clone())))
    }

    async fn find_metadata_by_entity_ids(
        &self,
        entity_ids: &[String],
        _entity_type: EntityType,
    ) -> StoreResult<OutboxLookup> {
        let mut lookup = OutboxLookup::default();
        for id in entity_ids {
            if self.unreadable.contains(id) {
                lookup
                    .failed
                    .insert(id.clone(), StoreError::backend("corrupt outbox entry"));
            } else if let Some(metadata) = self.readable.get(id) {
                lookup.found.insert(id.clone(), metadata.clone());
            }
        }
        Ok(lookup)
    }
}
