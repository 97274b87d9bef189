//! In-memory document store and outbox

use crate::document::MetadataStore;
use crate::error::StoreResult;
use crate::outbox::{OutboxLookup, OutboxStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tally_common::{EntityType, Metadata, MetadataDocument, MetadataFilter, OutboxEntry};

/// Metadata documents indexed by (entity type, entity id)
#[derive(Default)]
pub struct MemoryMetadataStore {
    documents: RwLock<HashMap<(EntityType, String), MetadataDocument>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document, replacing any previous one for the same entity
    pub fn insert(&self, document: MetadataDocument) {
        let key = (document.entity_type, document.entity_id.clone());
        self.documents.write().insert(key, document);
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<Option<MetadataDocument>> {
        Ok(self
            .documents
            .read()
            .get(&(entity_type, entity_id.to_string()))
            .cloned())
    }

    async fn find_by_entity_ids(
        &self,
        entity_type: EntityType,
        entity_ids: &[String],
    ) -> StoreResult<Vec<MetadataDocument>> {
        let documents = self.documents.read();
        Ok(entity_ids
            .iter()
            .filter_map(|id| documents.get(&(entity_type, id.clone())).cloned())
            .collect())
    }

    async fn find_by_predicate(
        &self,
        entity_type: EntityType,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<MetadataDocument>> {
        Ok(self
            .documents
            .read()
            .values()
            .filter(|doc| doc.entity_type == entity_type && filter.matches(&doc.data))
            .cloned()
            .collect())
    }
}

/// Staged outbox entries, newest entry per entity wins
#[derive(Default)]
pub struct MemoryOutbox {
    entries: RwLock<Vec<OutboxEntry>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: OutboxEntry) {
        self.entries.write().push(entry);
    }

    fn latest(&self, entity_id: &str, entity_type: EntityType) -> Option<OutboxEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .max_by_key(|e| e.created_at)
            .cloned()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn find_by_entity_id(
        &self,
        entity_id: &str,
        entity_type: EntityType,
    ) -> StoreResult<Option<OutboxEntry>> {
        Ok(self.latest(entity_id, entity_type))
    }

    async fn find_metadata_by_entity_ids(
        &self,
        entity_ids: &[String],
        entity_type: EntityType,
    ) -> StoreResult<OutboxLookup> {
        let found: HashMap<String, Metadata> = entity_ids
            .iter()
            .filter_map(|id| {
                self.latest(id, entity_type)
                    .map(|entry| (id.clone(), entry.metadata))
            })
            .collect();
        Ok(OutboxLookup {
            found,
            failed: HashMap::new(),
        })
    }
}
