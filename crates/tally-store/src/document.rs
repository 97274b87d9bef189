//! Document store port
//!
//! Per-entity metadata indexed asynchronously after the entity is written.
//! A missing document does not mean the entity has no metadata, only that
//! indexing has not caught up yet.

use crate::error::StoreResult;
use async_trait::async_trait;
use tally_common::{EntityType, MetadataDocument, MetadataFilter};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Metadata of a single entity, if indexed
    async fn find_by_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<Option<MetadataDocument>>;

    /// Metadata of every listed entity that has been indexed
    async fn find_by_entity_ids(
        &self,
        entity_type: EntityType,
        entity_ids: &[String],
    ) -> StoreResult<Vec<MetadataDocument>>;

    /// Every document of the entity type matching the filter. Unpaginated.
    async fn find_by_predicate(
        &self,
        entity_type: EntityType,
        filter: &MetadataFilter,
    ) -> StoreResult<Vec<MetadataDocument>>;
}
