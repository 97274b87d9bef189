//! In-memory relational store

use super::paginate;
use crate::error::{StoreError, StoreResult};
use crate::relational::{
    BalanceRepository, OperationRepository, RouteRepository, SettingRepository,
    TransactionRepository,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tally_common::{
    Balance, BalanceScope, CursorPage, Operation, OperationRoute, PageRequest, Setting,
    Transaction, TransactionRoute,
};
use uuid::Uuid;

/// Canonical ledger records held in memory
#[derive(Default)]
pub struct MemoryLedgerStore {
    balances: RwLock<HashMap<Uuid, Balance>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    operations: RwLock<HashMap<Uuid, Operation>>,
    operation_routes: RwLock<HashMap<Uuid, OperationRoute>>,
    transaction_routes: RwLock<HashMap<Uuid, TransactionRoute>>,
    /// Settings indexed by (organization, ledger, key)
    settings: RwLock<HashMap<(Uuid, Uuid, String), Setting>>,
}

impl MemoryLedgerStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_balance(&self, balance: Balance) {
        self.balances.write().insert(balance.id, balance);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.transactions.write().insert(transaction.id, transaction);
    }

    pub fn insert_operation(&self, operation: Operation) {
        self.operations.write().insert(operation.id, operation);
    }

    pub fn insert_operation_route(&self, route: OperationRoute) {
        self.operation_routes.write().insert(route.id, route);
    }

    pub fn insert_transaction_route(&self, route: TransactionRoute) {
        self.transaction_routes.write().insert(route.id, route);
    }

    pub fn insert_setting(&self, setting: Setting) {
        let key = (setting.organization_id, setting.ledger_id, setting.key.clone());
        self.settings.write().insert(key, setting);
    }
}

#[async_trait]
impl BalanceRepository for MemoryLedgerStore {
    async fn find_balances(&self, scope: &BalanceScope) -> StoreResult<Vec<Balance>> {
        let mut balances: Vec<Balance> = self
            .balances
            .read()
            .values()
            .filter(|b| scope.contains(b))
            .cloned()
            .collect();
        balances.sort_by_key(|b| (b.created_at, b.id));
        Ok(balances)
    }
}

#[async_trait]
impl TransactionRepository for MemoryLedgerStore {
    async fn find_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> StoreResult<Transaction> {
        self.transactions
            .read()
            .get(&transaction_id)
            .filter(|t| t.organization_id == organization_id && t.ledger_id == ledger_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "transaction",
            })
    }

    async fn find_transactions(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<Transaction>> {
        let items: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|t| t.organization_id == organization_id && t.ledger_id == ledger_id)
            .cloned()
            .collect();
        paginate(items, page, |t| (t.created_at, t.id))
    }
}

#[async_trait]
impl OperationRepository for MemoryLedgerStore {
    async fn find_operations(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<Operation>> {
        let items: Vec<Operation> = self
            .operations
            .read()
            .values()
            .filter(|o| {
                o.organization_id == organization_id
                    && o.ledger_id == ledger_id
                    && o.transaction_id == transaction_id
            })
            .cloned()
            .collect();
        paginate(items, page, |o| (o.created_at, o.id))
    }
}

#[async_trait]
impl RouteRepository for MemoryLedgerStore {
    async fn find_operation_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<OperationRoute>> {
        let items: Vec<OperationRoute> = self
            .operation_routes
            .read()
            .values()
            .filter(|r| r.organization_id == organization_id && r.ledger_id == ledger_id)
            .cloned()
            .collect();
        paginate(items, page, |r| (r.created_at, r.id))
    }

    async fn find_transaction_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<TransactionRoute>> {
        let items: Vec<TransactionRoute> = self
            .transaction_routes
            .read()
            .values()
            .filter(|r| r.organization_id == organization_id && r.ledger_id == ledger_id)
            .cloned()
            .collect();
        paginate(items, page, |r| (r.created_at, r.id))
    }
}

#[async_trait]
impl SettingRepository for MemoryLedgerStore {
    async fn find_setting(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        key: &str,
    ) -> StoreResult<Setting> {
        self.settings
            .read()
            .get(&(organization_id, ledger_id, key.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound { entity: "setting" })
    }
}
