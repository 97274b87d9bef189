//! Relational store ports
//!
//! The relational store is the canonical source for balances, transactions,
//! operations, routes and settings. Lookups of a single record return
//! [`StoreError::NotFound`](crate::StoreError::NotFound) when it is absent; page queries return an empty
//! page instead.

use crate::error::StoreResult;
use async_trait::async_trait;
use tally_common::{
    Balance, BalanceScope, CursorPage, Operation, OperationRoute, PageRequest, Setting,
    Transaction, TransactionRoute,
};
use uuid::Uuid;

/// Durable balance rows
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn find_balances(&self, scope: &BalanceScope) -> StoreResult<Vec<Balance>>;
}

/// Canonical transactions
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> StoreResult<Transaction>;

    async fn find_transactions(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<Transaction>>;
}

/// Canonical operations
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Operations of one transaction. Empty while the transaction is still
    /// being processed asynchronously.
    async fn find_operations(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<Operation>>;
}

/// Operation and transaction route definitions
#[async_trait]
pub trait RouteRepository: Send + Sync {
    async fn find_operation_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<OperationRoute>>;

    async fn find_transaction_routes(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<CursorPage<TransactionRoute>>;
}

/// Per-ledger settings
#[async_trait]
pub trait SettingRepository: Send + Sync {
    async fn find_setting(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        key: &str,
    ) -> StoreResult<Setting>;
}
