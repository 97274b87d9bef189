//! Tally Read - cross-store read reconciliation
//!
//! Ledger state is spread over a relational store, a document store, a
//! key-value cache and an outbox, each updated at a different time. This
//! crate assembles consistent read results from them:
//! - [`BalanceOverlay`]: cached in-flight balances over durable rows
//! - [`OperationPoller`]: bounded wait for asynchronously written operations
//! - [`MetadataJoiner`]: metadata enrichment and filtering of canonical pages
//! - [`MetadataResolver`] and [`fallback`]: metadata from the document store,
//!   the outbox, or the original request body
//! - [`SettingsAccessor`]: cache-aside settings with an inactive default
//!
//! [`LedgerReader`] combines them into one read surface.

pub mod fallback;
pub mod joiner;
pub mod overlay;
pub mod poller;
pub mod reader;
pub mod resolver;
pub mod settings;
pub mod stats;

#[cfg(test)]
mod testing;

pub use joiner::MetadataJoiner;
pub use overlay::{BalanceOverlay, OverlayReport};
pub use poller::{OperationPoller, POLL_BACKOFF, POLL_TIMEOUT, PollOutcome, Polled};
pub use reader::{LedgerReader, OperationsView, Ports, TransactionView};
pub use resolver::MetadataResolver;
pub use settings::SettingsAccessor;
pub use stats::{ReadStats, ReadStatsSnapshot};
