//! Tally Store - repository ports for the read path
//!
//! This crate defines one capability trait per backing store:
//! - Relational store (canonical balances, transactions, operations, routes, settings)
//! - Document store (asynchronously indexed per-entity metadata)
//! - Key-value cache (in-flight balance mirrors, setting flags)
//! - Outbox (metadata staged for indexing)
//!
//! and in-memory adapters for each, seeded directly or from a [`Snapshot`].

pub mod cache;
pub mod document;
pub mod error;
pub mod memory;
pub mod outbox;
pub mod relational;
pub mod snapshot;

pub use cache::CacheStore;
pub use document::MetadataStore;
pub use error::{StoreError, StoreResult};
pub use memory::{CacheStats, MemoryCache, MemoryLedgerStore, MemoryMetadataStore, MemoryOutbox};
pub use outbox::{OutboxLookup, OutboxStore};
pub use relational::{
    BalanceRepository, OperationRepository, RouteRepository, SettingRepository,
    TransactionRepository,
};
pub use snapshot::{Snapshot, Stores};
