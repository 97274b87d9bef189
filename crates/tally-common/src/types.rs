//! Core type definitions for Tally
//!
//! This module defines the ledger records served by the read path:
//! balances and their cache mirror, transactions with their original
//! request body, operations, routes, settings, metadata documents and
//! outbox entries.

use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Arbitrary key-value document attached to an entity
pub type Metadata = serde_json::Map<String, Value>;

/// Balance key used when a leg or operation does not name one
pub const DEFAULT_BALANCE_KEY: &str = "default";

/// Deterministic key into the key-value cache
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of the cached mirror of a balance: `(organization, ledger, alias#key)`
    #[must_use]
    pub fn balance(organization_id: Uuid, ledger_id: Uuid, alias: &str, key: &str) -> Self {
        Self(format!(
            "balance:{{transactions}}:{organization_id}:{ledger_id}:{alias}#{key}"
        ))
    }

    /// Key of the cached `active` flag of a setting
    #[must_use]
    pub fn setting(organization_id: Uuid, ledger_id: Uuid, key: &str) -> Self {
        Self(format!("setting:{organization_id}:{ledger_id}:{key}"))
    }

    /// Wrap a raw key (snapshots, external callers)
    #[must_use]
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =========== Balances ===========

/// Durable balance row for one account and balance key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub account_id: Uuid,
    /// Account alias (e.g. `@treasury`)
    pub alias: String,
    /// Balance key within the account (`default` unless the account has several)
    pub key: String,
    pub asset_code: String,
    pub available: Decimal,
    pub on_hold: Decimal,
    /// Optimistic-concurrency witness, bumped by the write path
    pub version: i64,
    #[serde(default)]
    pub account_type: String,
    #[serde(default = "default_true")]
    pub allow_sending: bool,
    #[serde(default = "default_true")]
    pub allow_receiving: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

const fn default_true() -> bool {
    true
}

impl Balance {
    /// Create a zeroed balance
    pub fn new(
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        alias: impl Into<String>,
        key: impl Into<String>,
        asset_code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            ledger_id,
            account_id,
            alias: alias.into(),
            key: key.into(),
            asset_code: asset_code.into(),
            available: Decimal::ZERO,
            on_hold: Decimal::ZERO,
            version: 0,
            account_type: "deposit".to_string(),
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Set amounts and version
    #[must_use]
    pub fn with_amounts(mut self, available: Decimal, on_hold: Decimal, version: i64) -> Self {
        self.available = available;
        self.on_hold = on_hold;
        self.version = version;
        self
    }

    /// Cache key of this balance's in-flight mirror
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::balance(self.organization_id, self.ledger_id, &self.alias, &self.key)
    }

    /// Replace the mutable fields with a cached mirror. Identity is untouched.
    pub fn apply_cached(&mut self, cached: &CachedBalance) {
        self.available = cached.available;
        self.on_hold = cached.on_hold;
        self.version = cached.version;
    }
}

/// Cache-resident mirror of a balance's mutable fields
///
/// Amounts are serialized as decimal strings; numbers are accepted on read.
/// Any other fields present in the cached payload are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBalance {
    pub available: Decimal,
    pub on_hold: Decimal,
    pub version: i64,
}

/// Which balances of a ledger to read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceScope {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub account_id: Option<Uuid>,
    pub alias: Option<String>,
}

impl BalanceScope {
    /// Every balance of the ledger
    #[must_use]
    pub const fn ledger(organization_id: Uuid, ledger_id: Uuid) -> Self {
        Self {
            organization_id,
            ledger_id,
            account_id: None,
            alias: None,
        }
    }

    #[must_use]
    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Check whether a balance falls within this scope
    #[must_use]
    pub fn contains(&self, balance: &Balance) -> bool {
        balance.organization_id == self.organization_id
            && balance.ledger_id == self.ledger_id
            && self.account_id.is_none_or(|id| balance.account_id == id)
            && self.alias.as_deref().is_none_or(|alias| balance.alias == alias)
    }
}

// =========== Transactions ===========

/// Transaction lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    Pending,
    Approved,
    Canceled,
    Noted,
}

/// Original request payload that produced a transaction. Never mutated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    #[serde(default)]
    pub chart_of_accounts_group_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// Two-phase transaction: sources are held first, then settled or released
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub send: Transfer,
}

impl TransactionBody {
    /// Whether the body names any source or destination leg
    #[must_use]
    pub fn has_legs(&self) -> bool {
        !self.send.source.from.is_empty() || !self.send.distribute.to.is_empty()
    }
}

/// The `send` block of a transaction request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub distribute: Distribute,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub remaining: Option<String>,
    #[serde(default)]
    pub from: Vec<Leg>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribute {
    #[serde(default)]
    pub remaining: Option<String>,
    #[serde(default)]
    pub to: Vec<Leg>,
}

/// One source or destination entry of a transaction request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    pub account_alias: String,
    #[serde(default)]
    pub balance_key: Option<String>,
    #[serde(default)]
    pub amount: Option<LegAmount>,
    #[serde(default)]
    pub share: Option<Share>,
    #[serde(default)]
    pub remaining: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chart_of_accounts: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Leg {
    pub fn new(account_alias: impl Into<String>) -> Self {
        Self {
            account_alias: account_alias.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_balance_key(mut self, key: impl Into<String>) -> Self {
        self.balance_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegAmount {
    pub asset: String,
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub percentage: i64,
    #[serde(default)]
    pub percentage_of_percentage: Option<i64>,
}

/// A ledger transaction as stored in the relational store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[serde(default)]
    pub parent_transaction_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub asset_code: String,
    #[serde(default)]
    pub chart_of_accounts_group_name: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub body: Option<TransactionBody>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        organization_id: Uuid,
        ledger_id: Uuid,
        status: TransactionStatus,
        asset_code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_transaction_id: None,
            organization_id,
            ledger_id,
            description: None,
            status,
            amount: None,
            asset_code: asset_code.into(),
            chart_of_accounts_group_name: None,
            route: None,
            body: None,
            operations: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: TransactionBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the originating request asked for two-phase processing
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.body.as_ref().is_some_and(|body| body.pending)
    }
}

// =========== Operations ===========

/// Kind of balance movement recorded by an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Debit,
    Credit,
    OnHold,
    Release,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
            Self::OnHold => "ON_HOLD",
            Self::Release => "RELEASE",
        };
        f.write_str(s)
    }
}

/// One balance movement belonging to a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    #[serde(default)]
    pub account_id: Option<Uuid>,
    pub account_alias: String,
    #[serde(default)]
    pub balance_id: Option<Uuid>,
    #[serde(default)]
    pub balance_key: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    #[serde(default)]
    pub asset_code: String,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(
        transaction: &Transaction,
        operation_type: OperationType,
        account_alias: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: transaction.id,
            organization_id: transaction.organization_id,
            ledger_id: transaction.ledger_id,
            account_id: None,
            account_alias: account_alias.into(),
            balance_id: None,
            balance_key: DEFAULT_BALANCE_KEY.to_string(),
            operation_type,
            asset_code: transaction.asset_code.clone(),
            amount: Decimal::ZERO,
            route: None,
            description: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_balance_key(mut self, key: impl Into<String>) -> Self {
        self.balance_key = key.into();
        self
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// =========== Routes ===========

/// Side of a transaction an operation route applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDirection {
    Source,
    Destination,
}

/// Accounting rule for a single leg of a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRoute {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub operation_type: RouteDirection,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperationRoute {
    pub fn new(
        organization_id: Uuid,
        ledger_id: Uuid,
        title: impl Into<String>,
        operation_type: RouteDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            ledger_id,
            title: title.into(),
            description: None,
            operation_type,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Named grouping of operation routes forming a transaction template
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRoute {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub operation_routes: Vec<Uuid>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRoute {
    pub fn new(organization_id: Uuid, ledger_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            ledger_id,
            title: title.into(),
            description: None,
            operation_routes: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// =========== Settings ===========

/// Per-ledger boolean feature flag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub key: String,
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    /// Build a setting with a freshly generated identity
    pub fn synthesized(
        organization_id: Uuid,
        ledger_id: Uuid,
        key: impl Into<String>,
        active: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            ledger_id,
            key: key.into(),
            active,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =========== Metadata documents & outbox ===========

/// Entity kinds that carry metadata in the document store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Transaction,
    Operation,
    OperationRoute,
    TransactionRoute,
    Balance,
}

impl EntityType {
    /// Collection name in the document store
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transaction => "Transaction",
            Self::Operation => "Operation",
            Self::OperationRoute => "OperationRoute",
            Self::TransactionRoute => "TransactionRoute",
            Self::Balance => "Balance",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indexed metadata for one entity. Written after the entity exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub data: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetadataDocument {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, data: Metadata) -> Self {
        let now = Utc::now();
        Self {
            entity_type,
            entity_id: entity_id.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Published,
    Failed,
}

/// Metadata staged for indexing into the document store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub metadata: Metadata,
    pub status: OutboxStatus,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn pending(entity_type: EntityType, entity_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id: entity_id.into(),
            metadata,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

/// Equality predicate over metadata keys
///
/// Values are compared by their text form, so `tier=1` matches both the
/// string `"1"` and the number `1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key == value` condition
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Parse `key=value` pairs
    pub fn parse<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut filter = Self::new();
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
            if key.is_empty() {
                return Err(format!("empty metadata key in '{pair}'"));
            }
            filter = filter.with(key, value);
        }
        Ok(filter)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check whether every condition holds for the given metadata
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|value| value_text(value) == *expected)
        })
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Records that carry a metadata map resolved from the document store
pub trait MetadataCarrier {
    /// Identifier under which the document store indexes this record
    fn entity_id(&self) -> String;

    fn metadata(&self) -> &Metadata;

    fn set_metadata(&mut self, metadata: Metadata);
}

macro_rules! impl_metadata_carrier {
    ($($ty:ty),*) => {
        $(
            impl MetadataCarrier for $ty {
                fn entity_id(&self) -> String {
                    self.id.to_string()
                }

                fn metadata(&self) -> &Metadata {
                    &self.metadata
                }

                fn set_metadata(&mut self, metadata: Metadata) {
                    self.metadata = metadata;
                }
            }
        )*
    };
}

impl_metadata_carrier!(Transaction, Operation, OperationRoute, TransactionRoute);

// =========== Pagination ===========

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Cursor pagination request against the relational store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    /// Opaque cursor returned by a previous page
    pub cursor: Option<String>,
    pub sort: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 10,
            cursor: None,
            sort: SortOrder::Asc,
        }
    }
}

impl PageRequest {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Clamp the limit into `1..=max`
    #[must_use]
    pub fn clamped(mut self, max: usize) -> Self {
        self.limit = self.limit.clamp(1, max.max(1));
        self
    }
}

/// One page of canonical records
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    /// Cursor for the following page, `None` on the last page
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    #[must_use]
    pub const fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
