//! JSON snapshot of every store
//!
//! A snapshot seeds the in-memory adapters in one step, e.g. to replay a
//! captured ledger state through the read path.

use crate::error::StoreResult;
use crate::memory::{MemoryCache, MemoryLedgerStore, MemoryMetadataStore, MemoryOutbox};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tally_common::{
    Balance, CacheKey, MetadataDocument, Operation, OperationRoute, OutboxEntry, Setting,
    Transaction, TransactionRoute,
};
use tracing::debug;

/// Serialized contents of all four stores
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub balances: Vec<Balance>,
    pub transactions: Vec<Transaction>,
    pub operations: Vec<Operation>,
    pub operation_routes: Vec<OperationRoute>,
    pub transaction_routes: Vec<TransactionRoute>,
    pub settings: Vec<Setting>,
    pub metadata: Vec<MetadataDocument>,
    pub outbox: Vec<OutboxEntry>,
    /// Raw cache entries. String values are stored as-is, anything else as
    /// its JSON text.
    pub cache: BTreeMap<String, Value>,
}

/// In-memory adapters populated from a snapshot
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<MemoryLedgerStore>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub outbox: Arc<MemoryOutbox>,
    pub cache: Arc<MemoryCache>,
}

impl Snapshot {
    pub fn from_json_str(text: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a snapshot file
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Build in-memory stores holding this snapshot's records
    pub fn into_stores(self) -> Stores {
        debug!(
            balances = self.balances.len(),
            transactions = self.transactions.len(),
            operations = self.operations.len(),
            metadata = self.metadata.len(),
            outbox = self.outbox.len(),
            cache = self.cache.len(),
            "Loading snapshot into memory stores"
        );

        let ledger = MemoryLedgerStore::new();
        self.balances.into_iter().for_each(|b| ledger.insert_balance(b));
        self.transactions
            .into_iter()
            .for_each(|t| ledger.insert_transaction(t));
        self.operations
            .into_iter()
            .for_each(|o| ledger.insert_operation(o));
        self.operation_routes
            .into_iter()
            .for_each(|r| ledger.insert_operation_route(r));
        self.transaction_routes
            .into_iter()
            .for_each(|r| ledger.insert_transaction_route(r));
        self.settings.into_iter().for_each(|s| ledger.insert_setting(s));

        let metadata = MemoryMetadataStore::new();
        self.metadata.into_iter().for_each(|d| metadata.insert(d));

        let outbox = MemoryOutbox::new();
        self.outbox.into_iter().for_each(|e| outbox.push(e));

        let cache = MemoryCache::new();
        for (key, value) in self.cache {
            let raw = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            cache.insert(CacheKey::from_raw(key), raw);
        }

        Stores {
            ledger: Arc::new(ledger),
            metadata: Arc::new(metadata),
            outbox: Arc::new(outbox),
            cache: Arc::new(cache),
        }
    }
}
