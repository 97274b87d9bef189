//! Metadata resolution for transactions and operations
//!
//! Metadata is written to the outbox with the entity and indexed into the
//! document store later. Reads consult, in order:
//!
//! 1. document store
//! 2. outbox
//! 3. the transaction's stored request body (see [`crate::fallback`])
//!
//! Failures of the first two are logged and treated as "not found" so the
//! next source gets a chance; the read itself never fails here.

use crate::fallback;
use crate::stats::ReadStats;
use std::collections::HashMap;
use std::sync::Arc;
use tally_common::{EntityType, Metadata, MetadataCarrier, Transaction};
use tally_store::{MetadataStore, OutboxStore};
use tracing::{debug, warn};

pub struct MetadataResolver {
    metadata: Arc<dyn MetadataStore>,
    outbox: Option<Arc<dyn OutboxStore>>,
    stats: Arc<ReadStats>,
}

fn missing_ids<T: MetadataCarrier>(items: &[T]) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.metadata().is_empty())
        .map(MetadataCarrier::entity_id)
        .collect()
}

fn fill_missing<T: MetadataCarrier>(items: &mut [T], found: &mut HashMap<String, Metadata>) -> usize {
    let mut filled = 0;
    for item in items.iter_mut().filter(|item| item.metadata().is_empty()) {
        if let Some(data) = found.remove(&item.entity_id()).filter(|m| !m.is_empty()) {
            item.set_metadata(data);
            filled += 1;
        }
    }
    filled
}

impl MetadataResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        outbox: Option<Arc<dyn OutboxStore>>,
        stats: Arc<ReadStats>,
    ) -> Self {
        Self { metadata, outbox, stats }
    }

    /// Resolve metadata of one transaction and its loaded operations
    pub async fn resolve_transaction(&self, transaction: &mut Transaction) {
        if transaction.metadata.is_empty() {
            let id = transaction.id.to_string();
            if let Some(data) = self.single(EntityType::Transaction, &id).await {
                transaction.metadata = data;
            }
        }

        self.resolve_many(EntityType::Operation, &mut transaction.operations)
            .await;
        self.apply_fallback(transaction);
    }

    /// Resolve metadata of a page of transactions
    pub async fn resolve_transactions(&self, transactions: &mut [Transaction]) {
        self.resolve_many(EntityType::Transaction, transactions).await;
        for transaction in transactions.iter_mut() {
            self.apply_fallback(transaction);
        }
    }

    /// Fill empty metadata of `items` from the document store, then the outbox
    pub async fn resolve_many<T: MetadataCarrier>(&self, entity_type: EntityType, items: &mut [T]) {
        let ids = missing_ids(items);
        if ids.is_empty() {
            return;
        }

        match self.metadata.find_by_entity_ids(entity_type, &ids).await {
            Ok(documents) => {
                let mut found: HashMap<String, Metadata> = documents
                    .into_iter()
                    .map(|doc| (doc.entity_id, doc.data))
                    .collect();
                let filled = fill_missing(items, &mut found);
                debug!(%entity_type, requested = ids.len(), filled, "Resolved metadata from document store");
            }
            Err(e) => {
                warn!(%entity_type, error = %e, "Document store unavailable, trying outbox");
            }
        }

        let Some(outbox) = &self.outbox else {
            return;
        };
        let ids = missing_ids(items);
        if ids.is_empty() {
            return;
        }

        match outbox.find_metadata_by_entity_ids(&ids, entity_type).await {
            Ok(mut lookup) => {
                for (entity_id, e) in &lookup.failed {
                    warn!(%entity_type, entity_id, error = %e, "Outbox entry unreadable");
                }
                let filled = fill_missing(items, &mut lookup.found);
                debug!(%entity_type, requested = ids.len(), filled, "Resolved metadata from outbox");
            }
            Err(e) => {
                warn!(%entity_type, error = %e, "Outbox unavailable, metadata may be incomplete");
            }
        }
    }

    /// Rebuild what is still missing from the stored request body
    pub fn apply_fallback(&self, transaction: &mut Transaction) {
        let report = fallback::reconcile_transaction(transaction);
        if report.total() > 0 {
            debug!(
                transaction_id = %transaction.id,
                transaction_filled = report.transaction_filled,
                operations_filled = report.operations_filled,
                "Rebuilt metadata from request body"
            );
            ReadStats::add(&self.stats.fallback_fills, report.total() as u64);
        }
    }

    async fn single(&self, entity_type: EntityType, entity_id: &str) -> Option<Metadata> {
        match self.metadata.find_by_entity(entity_type, entity_id).await {
            Ok(Some(doc)) if !doc.data.is_empty() => return Some(doc.data),
            Ok(_) => {}
            Err(e) => {
                warn!(%entity_type, entity_id, error = %e, "Document store unavailable, trying outbox");
            }
        }

        let outbox = self.outbox.as_ref()?;
        match outbox.find_by_entity_id(entity_id, entity_type).await {
            Ok(entry) => entry.map(|e| e.metadata).filter(|m| !m.is_empty()),
            Err(e) => {
                warn!(%entity_type, entity_id, error = %e, "Outbox unavailable, metadata may be incomplete");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PartialOutbox, UnavailableMetadata, UnavailableOutbox};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tally_common::{
        Distribute, Leg, MetadataDocument, Operation, OperationType, OutboxEntry, Source,
        TransactionBody, TransactionStatus, Transfer,
    };
    use tally_store::{MemoryMetadataStore, MemoryOutbox};
    use uuid::Uuid;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn transaction_with_body() -> Transaction {
        let body = TransactionBody {
            chart_of_accounts_group_name: None,
            description: None,
            code: None,
            pending: false,
            route: None,
            metadata: Some(metadata(json!({"source": "body"}))),
            send: Transfer {
                asset: "USD".to_string(),
                value: Decimal::from(10),
                source: Source {
                    remaining: None,
                    from: vec![Leg::new("@alice").with_metadata(metadata(json!({"source": "body"})))],
                },
                distribute: Distribute {
                    remaining: None,
                    to: vec![Leg::new("@bob").with_metadata(metadata(json!({"source": "body"})))],
                },
            },
        };
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), TransactionStatus::Approved, "USD")
            .with_body(body);
        tx.operations = vec![
            Operation::new(&tx, OperationType::Debit, "@alice"),
            Operation::new(&tx, OperationType::Credit, "@bob"),
        ];
        tx
    }

    #[tokio::test]
    async fn test_document_store_wins() {
        let documents = Arc::new(MemoryMetadataStore::new());
        let outbox = Arc::new(MemoryOutbox::new());
        let mut tx = transaction_with_body();
        documents.insert(MetadataDocument::new(
            EntityType::Transaction,
            tx.id.to_string(),
            metadata(json!({"source": "document"})),
        ));
        outbox.push(OutboxEntry::pending(
            EntityType::Transaction,
            tx.id.to_string(),
            metadata(json!({"source": "outbox"})),
        ));
        documents.insert(MetadataDocument::new(
            EntityType::Operation,
            tx.operations[0].id.to_string(),
            metadata(json!({"source": "document"})),
        ));
        outbox.push(OutboxEntry::pending(
            EntityType::Operation,
            tx.operations[1].id.to_string(),
            metadata(json!({"source": "outbox"})),
        ));

        let stats = Arc::new(ReadStats::default());
        let resolver = MetadataResolver::new(documents, Some(outbox), stats.clone());
        resolver.resolve_transaction(&mut tx).await;

        assert_eq!(tx.metadata["source"], "document");
        assert_eq!(tx.operations[0].metadata["source"], "document");
        assert_eq!(tx.operations[1].metadata["source"], "outbox");
        assert_eq!(stats.snapshot().fallback_fills, 0);
    }

    #[tokio::test]
    async fn test_outbox_before_body() {
        let outbox = Arc::new(MemoryOutbox::new());
        let mut tx = transaction_with_body();
        outbox.push(OutboxEntry::pending(
            EntityType::Transaction,
            tx.id.to_string(),
            metadata(json!({"source": "outbox"})),
        ));

        let resolver = MetadataResolver::new(
            Arc::new(MemoryMetadataStore::new()),
            Some(outbox),
            Arc::new(ReadStats::default()),
        );
        resolver.resolve_transaction(&mut tx).await;

        assert_eq!(tx.metadata["source"], "outbox");
        assert_eq!(tx.operations[0].metadata["source"], "body");
        assert_eq!(tx.operations[1].metadata["source"], "body");
    }

    #[tokio::test]
    async fn test_unavailable_stores_fall_back_to_body() {
        let stats = Arc::new(ReadStats::default());
        let resolver = MetadataResolver::new(
            Arc::new(UnavailableMetadata),
            Some(Arc::new(UnavailableOutbox)),
            stats.clone(),
        );
        let mut tx = transaction_with_body();

        resolver.resolve_transaction(&mut tx).await;

        assert_eq!(tx.metadata["source"], "body");
        assert!(tx.operations.iter().all(|op| op.metadata["source"] == "body"));
        assert_eq!(stats.snapshot().fallback_fills, 3);
    }

    #[tokio::test]
    async fn test_unreadable_outbox_entries_do_not_block_others() {
        let mut tx = transaction_with_body();
        let outbox = PartialOutbox::default()
            .readable(tx.operations[0].id.to_string(), metadata(json!({"source": "outbox"})))
            .unreadable(tx.operations[1].id.to_string());

        let stats = Arc::new(ReadStats::default());
        let resolver = MetadataResolver::new(
            Arc::new(MemoryMetadataStore::new()),
            Some(Arc::new(outbox)),
            stats.clone(),
        );
        resolver.resolve_transaction(&mut tx).await;

        assert_eq!(tx.operations[0].metadata["source"], "outbox");
        assert_eq!(tx.operations[1].metadata["source"], "body");
        assert_eq!(tx.metadata["source"], "body");
        // transaction metadata plus the unreadable operation
        assert_eq!(stats.snapshot().fallback_fills, 2);
    }

    #[tokio::test]
    async fn test_page_of_transactions() {
        let documents = Arc::new(MemoryMetadataStore::new());
        let mut page = vec![transaction_with_body(), transaction_with_body()];
        page[1].body = None;
        documents.insert(MetadataDocument::new(
            EntityType::Transaction,
            page[0].id.to_string(),
            metadata(json!({"source": "document"})),
        ));

        let resolver = MetadataResolver::new(documents, None, Arc::new(ReadStats::default()));
        resolver.resolve_transactions(&mut page).await;

        assert_eq!(page[0].metadata["source"], "document");
        assert!(page[1].metadata.is_empty());
    }
}
