//! In-memory store adapters
//!
//! Back every port with `parking_lot`-guarded maps. Used by the CLI when
//! serving a snapshot file, and by tests.

mod cache;
mod ledger;
mod metadata;

pub use cache::{CacheStats, MemoryCache};
pub use ledger::MemoryLedgerStore;
pub use metadata::{MemoryMetadataStore, MemoryOutbox};

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use tally_common::{CursorPage, PageRequest, SortOrder};
use uuid::Uuid;

/// Cut one cursor page out of a full result set.
///
/// Records are ordered by `(created_at, id)`; the cursor is the id of the
/// last record of the previous page.
fn paginate<T>(
    mut items: Vec<T>,
    page: &PageRequest,
    order_key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
) -> StoreResult<CursorPage<T>> {
    items.sort_by_key(&order_key);
    if page.sort == SortOrder::Desc {
        items.reverse();
    }

    let start = match &page.cursor {
        None => 0,
        Some(cursor) => {
            let after = Uuid::parse_str(cursor)
                .map_err(|_| StoreError::InvalidCursor(cursor.clone()))?;
            items
                .iter()
                .position(|item| order_key(item).1 == after)
                .map(|pos| pos + 1)
                .ok_or_else(|| StoreError::InvalidCursor(cursor.clone()))?
        }
    };

    let end = (start + page.limit.max(1)).min(items.len());
    let next_cursor = (end < items.len()).then(|| order_key(&items[end - 1]).1.to_string());
    let items = items.drain(start..end).collect();

    Ok(CursorPage { items, next_cursor })
}
