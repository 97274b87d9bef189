//! Reconciled read surface of the ledger
//!
//! [`LedgerReader`] wires the reconciliation components over one set of
//! store ports:
//! - balances: relational rows + cache overlay
//! - transactions and operations: relational rows + poller + metadata resolver
//! - routes: relational rows + metadata joiner
//! - settings: cache-aside accessor

use crate::fallback;
use crate::joiner::MetadataJoiner;
use crate::overlay::BalanceOverlay;
use crate::poller::OperationPoller;
use crate::resolver::MetadataResolver;
use crate::settings::SettingsAccessor;
use crate::stats::ReadStats;
use serde::Serialize;
use std::sync::Arc;
use tally_common::config::PaginationConfig;
use tally_common::{
    Balance, BalanceScope, Config, CursorPage, EntityType, MetadataFilter, Operation,
    OperationRoute, PageRequest, Result, Setting, Transaction, TransactionRoute,
};
use tally_store::{
    BalanceRepository, CacheStore, MetadataStore, OperationRepository, OutboxStore,
    RouteRepository, SettingRepository, Stores, TransactionRepository,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store handles the reader depends on
#[derive(Clone)]
pub struct Ports {
    pub balances: Arc<dyn BalanceRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub operations: Arc<dyn OperationRepository>,
    pub routes: Arc<dyn RouteRepository>,
    pub settings: Arc<dyn SettingRepository>,
    pub metadata: Arc<dyn MetadataStore>,
    pub cache: Arc<dyn CacheStore>,
    /// Optional; without it metadata resolution skips straight to the request body
    pub outbox: Option<Arc<dyn OutboxStore>>,
}

impl From<&Stores> for Ports {
    fn from(stores: &Stores) -> Self {
        Self {
            balances: stores.ledger.clone(),
            transactions: stores.ledger.clone(),
            operations: stores.ledger.clone(),
            routes: stores.ledger.clone(),
            settings: stores.ledger.clone(),
            metadata: stores.metadata.clone(),
            cache: stores.cache.clone(),
            outbox: Some(stores.outbox.clone()),
        }
    }
}

/// A transaction and whether its operations may still be arriving
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub processing_pending: bool,
}

/// A page of a transaction's operations
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsView {
    #[serde(flatten)]
    pub page: CursorPage<Operation>,
    pub processing_pending: bool,
}

pub struct LedgerReader {
    ports: Ports,
    overlay: BalanceOverlay,
    poller: OperationPoller,
    joiner: MetadataJoiner,
    resolver: MetadataResolver,
    settings: SettingsAccessor,
    pagination: PaginationConfig,
    stats: Arc<ReadStats>,
}

impl LedgerReader {
    pub fn new(ports: Ports, config: &Config) -> Self {
        let stats = Arc::new(ReadStats::default());
        info!(
            async_processing = config.processing.async_mode,
            max_limit = config.pagination.max_limit,
            outbox = ports.outbox.is_some(),
            "Ledger reader initialized"
        );

        Self {
            overlay: BalanceOverlay::new(ports.cache.clone(), stats.clone()),
            poller: OperationPoller::new(config.processing.async_mode).with_stats(stats.clone()),
            joiner: MetadataJoiner::new(ports.metadata.clone()),
            resolver: MetadataResolver::new(ports.metadata.clone(), ports.outbox.clone(), stats.clone()),
            settings: SettingsAccessor::new(ports.settings.clone(), ports.cache.clone()),
            pagination: config.pagination.clone(),
            stats,
            ports,
        }
    }

    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }

    fn clamp(&self, page: PageRequest) -> PageRequest {
        page.clamped(self.pagination.max_limit)
    }

    /// Balances in scope with in-flight cached values applied
    pub async fn balances(&self, scope: &BalanceScope) -> Result<Vec<Balance>> {
        let balances = self.ports.balances.find_balances(scope).await?;
        debug!(count = balances.len(), "Fetched durable balances");
        Ok(self.overlay.apply(balances).await)
    }

    /// One transaction with all of its operations and resolved metadata.
    ///
    /// Operations are read page by page until the relational cursor is
    /// exhausted.
    ///
    /// Under asynchronous processing, a transaction whose operations do not
    /// appear before the poll ends is still returned, flagged as pending.
    pub async fn transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TransactionView> {
        let mut transaction = self
            .ports
            .transactions
            .find_transaction(organization_id, ledger_id, transaction_id)
            .await?;

        let page = PageRequest::new(self.pagination.max_limit);
        let polled = self
            .poller
            .poll(cancel, || {
                self.ports
                    .operations
                    .find_operations(organization_id, ledger_id, transaction_id, &page)
            })
            .await?;

        let processing_pending = polled.outcome.may_be_in_flight();
        if processing_pending {
            warn!(
                %transaction_id,
                outcome = ?polled.outcome,
                attempts = polled.attempts,
                "Returning transaction without operations"
            );
        }

        let mut operations = polled.page.items;
        let mut next_cursor = polled.page.next_cursor;
        while let Some(cursor) = next_cursor {
            let next = PageRequest::new(self.pagination.max_limit).with_cursor(cursor);
            let more = self
                .ports
                .operations
                .find_operations(organization_id, ledger_id, transaction_id, &next)
                .await?;
            operations.extend(more.items);
            next_cursor = more.next_cursor;
        }
        debug!(%transaction_id, operations = operations.len(), "Loaded transaction operations");

        transaction.operations = operations;
        self.resolver.resolve_transaction(&mut transaction).await;

        Ok(TransactionView {
            transaction,
            processing_pending,
        })
    }

    /// A page of transactions with resolved metadata
    pub async fn transactions(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: PageRequest,
    ) -> Result<CursorPage<Transaction>> {
        let page = self.clamp(page);
        let mut transactions = self
            .ports
            .transactions
            .find_transactions(organization_id, ledger_id, &page)
            .await?;

        self.resolver
            .resolve_transactions(&mut transactions.items)
            .await;
        Ok(transactions)
    }

    /// A page of one transaction's operations with resolved metadata
    pub async fn transaction_operations(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<OperationsView> {
        let transaction = self
            .ports
            .transactions
            .find_transaction(organization_id, ledger_id, transaction_id)
            .await?;

        let page = self.clamp(page);
        let polled = self
            .poller
            .poll(cancel, || {
                self.ports
                    .operations
                    .find_operations(organization_id, ledger_id, transaction_id, &page)
            })
            .await?;

        let mut operations = polled.page;
        self.resolver
            .resolve_many(EntityType::Operation, &mut operations.items)
            .await;

        if let Some(body) = &transaction.body {
            let filled = fallback::reconcile_operations(body, transaction.status, &mut operations.items);
            if filled > 0 {
                debug!(%transaction_id, filled, "Rebuilt operation metadata from request body");
                ReadStats::add(&self.stats.fallback_fills, filled as u64);
            }
        }

        Ok(OperationsView {
            page: operations,
            processing_pending: polled.outcome.may_be_in_flight(),
        })
    }

    /// Operation routes, enriched with metadata or filtered by it
    pub async fn operation_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: PageRequest,
        filter: Option<&MetadataFilter>,
    ) -> Result<CursorPage<OperationRoute>> {
        let page = self.clamp(page);
        let fetch = self
            .ports
            .routes
            .find_operation_routes(organization_id, ledger_id, &page);

        match filter.filter(|f| !f.is_empty()) {
            Some(filter) => {
                self.joiner
                    .filter(EntityType::OperationRoute, filter, fetch)
                    .await
            }
            None => self.joiner.enrich(EntityType::OperationRoute, fetch).await,
        }
    }

    /// Transaction routes, enriched with metadata or filtered by it
    pub async fn transaction_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: PageRequest,
        filter: Option<&MetadataFilter>,
    ) -> Result<CursorPage<TransactionRoute>> {
        let page = self.clamp(page);
        let fetch = self
            .ports
            .routes
            .find_transaction_routes(organization_id, ledger_id, &page);

        match filter.filter(|f| !f.is_empty()) {
            Some(filter) => {
                self.joiner
                    .filter(EntityType::TransactionRoute, filter, fetch)
                    .await
            }
            None => self.joiner.enrich(EntityType::TransactionRoute, fetch).await,
        }
    }

    /// A ledger setting, inactive when undefined
    pub async fn setting(&self, organization_id: Uuid, ledger_id: Uuid, key: &str) -> Result<Setting> {
        self.settings
            .get_or_create(organization_id, ledger_id, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::UnavailableCache;
    use rust_decimal::Decimal;
    use serde_json::json;
    use tally_common::{
        CacheKey, Distribute, Leg, Metadata, MetadataDocument, OperationType, RouteDirection,
        Source, TransactionBody, TransactionStatus, Transfer,
    };
    use tally_store::{MemoryCache, MemoryLedgerStore, MemoryMetadataStore, MemoryOutbox};

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    struct Harness {
        org: Uuid,
        ledger: Uuid,
        stores: Stores,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                org: Uuid::new_v4(),
                ledger: Uuid::new_v4(),
                stores: Stores {
                    ledger: Arc::new(MemoryLedgerStore::new()),
                    metadata: Arc::new(MemoryMetadataStore::new()),
                    outbox: Arc::new(MemoryOutbox::new()),
                    cache: Arc::new(MemoryCache::new()),
                },
            }
        }

        fn reader(&self, async_mode: bool) -> LedgerReader {
            let mut config = Config::default();
            config.processing.async_mode = async_mode;
            config.pagination.max_limit = 3;
            LedgerReader::new(Ports::from(&self.stores), &config)
        }

        fn transaction(&self) -> Transaction {
            let body = TransactionBody {
                chart_of_accounts_group_name: None,
                description: None,
                code: None,
                pending: false,
                route: None,
                metadata: Some(metadata(json!({"invoice": "INV-1"}))),
                send: Transfer {
                    asset: "USD".to_string(),
                    value: Decimal::from(50),
                    source: Source {
                        remaining: None,
                        from: vec![Leg::new("@alice").with_metadata(metadata(json!({"leg": "from"})))],
                    },
                    distribute: Distribute {
                        remaining: None,
                        to: vec![Leg::new("@bob").with_metadata(metadata(json!({"leg": "to"})))],
                    },
                },
            };
            let tx = Transaction::new(self.org, self.ledger, TransactionStatus::Approved, "USD").with_body(body);
            self.stores.ledger.insert_transaction(tx.clone());
            tx
        }
    }

    #[tokio::test]
    async fn test_balances_overlay_cached_values() {
        let h = Harness::new();
        let balance = Balance::new(h.org, h.ledger, Uuid::new_v4(), "@alice", "USD", "USD")
            .with_amounts(Decimal::from(10), Decimal::from(2), 1);
        h.stores.ledger.insert_balance(balance.clone());
        h.stores.cache.insert(
            CacheKey::from_raw(format!("balance:{{transactions}}:{}:{}:@alice#USD", h.org, h.ledger)),
            r#"{"available":"5","onHold":"1","version":3}"#,
        );

        let balances = h
            .reader(false)
            .balances(&BalanceScope::ledger(h.org, h.ledger))
            .await
            .unwrap();

        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].id, balance.id);
        assert_eq!(balances[0].available, Decimal::from(5));
        assert_eq!(balances[0].on_hold, Decimal::from(1));
        assert_eq!(balances[0].version, 3);
    }

    #[tokio::test]
    async fn test_balances_survive_cache_outage() {
        let h = Harness::new();
        let balance = Balance::new(h.org, h.ledger, Uuid::new_v4(), "@alice", "USD", "USD")
            .with_amounts(Decimal::from(10), Decimal::from(2), 1);
        h.stores.ledger.insert_balance(balance.clone());
        let mut ports = Ports::from(&h.stores);
        ports.cache = Arc::new(UnavailableCache::default());
        let reader = LedgerReader::new(ports, &Config::default());

        let balances = reader
            .balances(&BalanceScope::ledger(h.org, h.ledger))
            .await
            .unwrap();
        assert_eq!(balances, vec![balance]);
        assert_eq!(reader.stats().snapshot().degraded_overlays, 1);
    }

    #[tokio::test]
    async fn test_transaction_rebuilds_metadata_from_body() {
        let h = Harness::new();
        let tx = h.transaction();
        h.stores
            .ledger
            .insert_operation(Operation::new(&tx, OperationType::Debit, "@alice"));
        h.stores
            .ledger
            .insert_operation(Operation::new(&tx, OperationType::Credit, "@bob"));

        let view = h
            .reader(true)
            .transaction(h.org, h.ledger, tx.id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!view.processing_pending);
        assert_eq!(view.transaction.metadata["invoice"], "INV-1");
        assert_eq!(view.transaction.operations.len(), 2);
        for op in &view.transaction.operations {
            let expected = match op.operation_type {
                OperationType::Debit => "from",
                _ => "to",
            };
            assert_eq!(op.metadata["leg"], expected);
        }
    }

    #[tokio::test]
    async fn test_transaction_loads_operations_beyond_one_page() {
        let h = Harness::new();
        let tx = h.transaction();
        let base = chrono::Utc::now();
        let mut stored = Vec::new();
        for i in 0..5 {
            let mut op = Operation::new(&tx, OperationType::Credit, "@bob");
            op.created_at = base + chrono::Duration::seconds(i);
            stored.push(op.id);
            h.stores.ledger.insert_operation(op);
        }

        let view = h
            .reader(false)
            .transaction(h.org, h.ledger, tx.id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!view.processing_pending);
        let returned: Vec<Uuid> = view.transaction.operations.iter().map(|op| op.id).collect();
        assert_eq!(returned, stored);
        assert!(view.transaction.operations.iter().all(|op| op.metadata["leg"] == "to"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_without_operations_times_out_as_pending() {
        let h = Harness::new();
        let tx = h.transaction();
        let reader = h.reader(true);

        let view = reader
            .transaction(h.org, h.ledger, tx.id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(view.processing_pending);
        assert!(view.transaction.operations.is_empty());
        assert_eq!(reader.stats().snapshot().poll_timeouts, 1);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["processingPending"], true);
        assert_eq!(json["id"], tx.id.to_string());
    }

    #[tokio::test]
    async fn test_transaction_without_operations_sync_mode() {
        let h = Harness::new();
        let tx = h.transaction();
        let reader = h.reader(false);

        let view = reader
            .transaction(h.org, h.ledger, tx.id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!view.processing_pending);
        assert_eq!(reader.stats().snapshot().poll_attempts, 1);
    }

    #[tokio::test]
    async fn test_missing_transaction_is_not_found() {
        let h = Harness::new();
        let err = h
            .reader(false)
            .transaction(h.org, h.ledger, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), "TALLY-0007");
    }

    #[tokio::test]
    async fn test_transaction_operations_prefers_indexed_metadata() {
        let h = Harness::new();
        let tx = h.transaction();
        let debit = Operation::new(&tx, OperationType::Debit, "@alice");
        let credit = Operation::new(&tx, OperationType::Credit, "@bob");
        h.stores.ledger.insert_operation(debit.clone());
        h.stores.ledger.insert_operation(credit.clone());
        h.stores.metadata.insert(MetadataDocument::new(
            EntityType::Operation,
            debit.id.to_string(),
            metadata(json!({"leg": "indexed"})),
        ));

        let view = h
            .reader(false)
            .transaction_operations(h.org, h.ledger, tx.id, PageRequest::new(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(view.page.len(), 2);
        let by_id = |id: Uuid| view.page.items.iter().find(|op| op.id == id).unwrap();
        assert_eq!(by_id(debit.id).metadata["leg"], "indexed");
        assert_eq!(by_id(credit.id).metadata["leg"], "to");
    }

    #[tokio::test]
    async fn test_transactions_page_is_clamped() {
        let h = Harness::new();
        for _ in 0..5 {
            h.transaction();
        }

        let page = h
            .reader(false)
            .transactions(h.org, h.ledger, PageRequest::new(50))
            .await
            .unwrap();

        assert_eq!(page.len(), 3);
        assert!(page.next_cursor.is_some());
        assert!(page.items.iter().all(|tx| tx.metadata["invoice"] == "INV-1"));
    }

    #[tokio::test]
    async fn test_routes_enrich_or_filter() {
        let h = Harness::new();
        let tagged = OperationRoute::new(h.org, h.ledger, "fees", RouteDirection::Source);
        let plain = OperationRoute::new(h.org, h.ledger, "plain", RouteDirection::Destination);
        h.stores.ledger.insert_operation_route(tagged.clone());
        h.stores.ledger.insert_operation_route(plain.clone());
        h.stores.metadata.insert(MetadataDocument::new(
            EntityType::OperationRoute,
            tagged.id.to_string(),
            metadata(json!({"kind": "fee"})),
        ));
        let reader = h.reader(false);

        let all = reader
            .operation_routes(h.org, h.ledger, PageRequest::new(10), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let empty_filter = MetadataFilter::new();
        let all_again = reader
            .operation_routes(h.org, h.ledger, PageRequest::new(10), Some(&empty_filter))
            .await
            .unwrap();
        assert_eq!(all_again.len(), 2);

        let filter = MetadataFilter::new().with("kind", "fee");
        let fees = reader
            .operation_routes(h.org, h.ledger, PageRequest::new(10), Some(&filter))
            .await
            .unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees.items[0].id, tagged.id);
        assert_eq!(fees.items[0].metadata["kind"], "fee");
    }

    #[tokio::test]
    async fn test_transaction_routes_enriched() {
        let h = Harness::new();
        let route = TransactionRoute::new(h.org, h.ledger, "payout");
        h.stores.ledger.insert_transaction_route(route.clone());
        h.stores.metadata.insert(MetadataDocument::new(
            EntityType::TransactionRoute,
            route.id.to_string(),
            metadata(json!({"team": "payments"})),
        ));

        let page = h
            .reader(false)
            .transaction_routes(h.org, h.ledger, PageRequest::new(10), None)
            .await
            .unwrap();
        assert_eq!(page.items[0].metadata["team"], "payments");
    }

    #[tokio::test]
    async fn test_setting_defaults_to_inactive() {
        let h = Harness::new();
        let setting = h
            .reader(false)
            .setting(h.org, h.ledger, "missing-key")
            .await
            .unwrap();

        assert!(!setting.active);
        assert_eq!(
            h.stores
                .cache
                .peek(&CacheKey::setting(h.org, h.ledger, "missing-key"))
                .as_deref(),
            Some("false")
        );
    }
}
