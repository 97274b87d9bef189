//! Outbox port
//!
//! Metadata staged by the write path for indexing into the document store.
//! Querying it directly sees metadata sooner than the document store does.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tally_common::{EntityType, Metadata, OutboxEntry};

/// Result of a batched outbox lookup
#[derive(Debug, Default)]
pub struct OutboxLookup {
    /// Metadata per entity id
    pub found: HashMap<String, Metadata>,
    /// Entities whose entry could not be read
    pub failed: HashMap<String, StoreError>,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn find_by_entity_id(
        &self,
        entity_id: &str,
        entity_type: EntityType,
    ) -> StoreResult<Option<OutboxEntry>>;

    async fn find_metadata_by_entity_ids(
        &self,
        entity_ids: &[String],
        entity_type: EntityType,
    ) -> StoreResult<OutboxLookup>;
}
