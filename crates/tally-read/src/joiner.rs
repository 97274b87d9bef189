//! Joins canonical records with their document-store metadata
//!
//! Two modes:
//! - enrich: attach metadata to every record of a canonical page
//! - filter: keep only records whose metadata matches a predicate
//!
//! Filtering narrows the canonical page rather than re-paginating, so a
//! qualifying record outside the current page window only shows up when
//! that page is requested.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tally_common::{
    CursorPage, EntityType, Error, Metadata, MetadataCarrier, MetadataDocument, MetadataFilter,
    Result,
};
use tally_store::{MetadataStore, StoreResult};
use tracing::debug;

/// Merges canonical pages with per-entity metadata documents
pub struct MetadataJoiner {
    metadata: Arc<dyn MetadataStore>,
}

fn index_by_entity(documents: Vec<MetadataDocument>) -> HashMap<String, Metadata> {
    documents
        .into_iter()
        .map(|doc| (doc.entity_id, doc.data))
        .collect()
}

impl MetadataJoiner {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Attach metadata to every record of the page. Records without a
    /// document end up with empty metadata.
    pub async fn enrich<T, Fut>(&self, entity_type: EntityType, fetch_page: Fut) -> Result<CursorPage<T>>
    where
        T: MetadataCarrier,
        Fut: Future<Output = StoreResult<CursorPage<T>>>,
    {
        let mut page = fetch_page.await?;
        if page.is_empty() {
            return Ok(page);
        }

        let ids: Vec<String> = page.items.iter().map(MetadataCarrier::entity_id).collect();
        let documents = self
            .metadata
            .find_by_entity_ids(entity_type, &ids)
            .await
            .map_err(|e| Error::Metadata(e.to_string()))?;
        let mut by_id = index_by_entity(documents);

        for item in &mut page.items {
            let data = by_id.remove(&item.entity_id()).unwrap_or_default();
            item.set_metadata(data);
        }

        debug!(%entity_type, records = page.len(), "Enriched page with metadata");
        Ok(page)
    }

    /// Keep only records of the page that have a document matching `filter`.
    ///
    /// The document store is queried first; its error aborts the read before
    /// the canonical store is touched.
    pub async fn filter<T, Fut>(
        &self,
        entity_type: EntityType,
        filter: &MetadataFilter,
        fetch_page: Fut,
    ) -> Result<CursorPage<T>>
    where
        T: MetadataCarrier,
        Fut: Future<Output = StoreResult<CursorPage<T>>>,
    {
        let documents = self
            .metadata
            .find_by_predicate(entity_type, filter)
            .await
            .map_err(|e| Error::Metadata(e.to_string()))?;
        let mut by_id = index_by_entity(documents);

        let page = fetch_page.await?;
        let fetched = page.len();
        let items: Vec<T> = page
            .items
            .into_iter()
            .filter_map(|mut item| {
                by_id.remove(&item.entity_id()).map(|data| {
                    item.set_metadata(data);
                    item
                })
            })
            .collect();

        debug!(%entity_type, fetched, matched = items.len(), "Filtered page by metadata");
        Ok(CursorPage {
            items,
            next_cursor: page.next_cursor,
        })
    }
}
