//! Rebuild missing metadata from the original transaction request
//!
//! When neither the document store nor the outbox has metadata yet, the
//! request body stored with the transaction still does. Transaction-level
//! metadata is copied over directly. Operation metadata is matched to the
//! body's legs by `(type, alias, balance key, route)`, with progressively
//! less specific keys as fallbacks:
//!
//! 1. full key
//! 2. route dropped
//! 3. balance key dropped
//! 4. both dropped
//!
//! Each leg registers all four variants; when two legs share a degraded
//! variant the first one registered keeps it. Reconciliation only fills
//! empty maps and never overwrites metadata that is already present.

use std::collections::HashMap;
use tally_common::{
    Leg, Metadata, Operation, OperationType, Transaction, TransactionBody, TransactionStatus,
    DEFAULT_BALANCE_KEY,
};

/// Reduce an alias as written in a request to the form stored on operations.
///
/// `alias` is kept as-is, `alias#key` yields `alias`, and anything with more
/// separators yields its second segment.
pub fn normalize_alias(alias: &str) -> &str {
    let mut segments = alias.split('#');
    match alias.matches('#').count() {
        0 => alias,
        1 => segments.next().unwrap_or(alias),
        _ => segments.nth(1).unwrap_or(alias),
    }
}

fn balance_key_or_default(key: Option<&str>) -> &str {
    key.filter(|k| !k.is_empty()).unwrap_or(DEFAULT_BALANCE_KEY)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LegKey {
    operation_type: OperationType,
    alias: String,
    balance_key: String,
    route: String,
}

impl LegKey {
    fn for_leg(operation_type: OperationType, leg: &Leg) -> Self {
        Self {
            operation_type,
            alias: normalize_alias(&leg.account_alias).to_string(),
            balance_key: balance_key_or_default(leg.balance_key.as_deref()).to_string(),
            route: leg.route.clone().unwrap_or_default(),
        }
    }

    fn for_operation(operation: &Operation) -> Self {
        Self {
            operation_type: operation.operation_type,
            alias: operation.account_alias.clone(),
            balance_key: balance_key_or_default(Some(&operation.balance_key)).to_string(),
            route: operation.route.clone().unwrap_or_default(),
        }
    }

    /// Most to least specific
    fn cascade(&self) -> [Self; 4] {
        let without_route = Self {
            route: String::new(),
            ..self.clone()
        };
        let without_key = Self {
            balance_key: String::new(),
            ..self.clone()
        };
        let bare = Self {
            balance_key: String::new(),
            route: String::new(),
            ..self.clone()
        };
        [self.clone(), without_route, without_key, bare]
    }
}

/// Operation types a source leg produces.
///
/// Two-phase transactions hold funds first and later settle (approve) or
/// return them (cancel).
fn source_types(pending: bool, status: TransactionStatus) -> Vec<OperationType> {
    if !pending {
        return vec![OperationType::Debit];
    }
    let mut types = vec![OperationType::OnHold];
    match status {
        TransactionStatus::Approved => types.push(OperationType::Debit),
        TransactionStatus::Canceled => types.push(OperationType::Release),
        _ => {}
    }
    types
}

/// Leg metadata keyed for operation lookup
#[derive(Debug, Default)]
pub struct LegIndex {
    entries: HashMap<LegKey, Metadata>,
}

impl LegIndex {
    pub fn from_body(body: &TransactionBody, status: TransactionStatus) -> Self {
        let mut index = Self::default();

        let types = source_types(body.pending, status);
        for leg in &body.send.source.from {
            for operation_type in &types {
                index.register(LegKey::for_leg(*operation_type, leg), leg.metadata.as_ref());
            }
        }
        for leg in &body.send.distribute.to {
            index.register(LegKey::for_leg(OperationType::Credit, leg), leg.metadata.as_ref());
        }

        index
    }

    fn register(&mut self, key: LegKey, metadata: Option<&Metadata>) {
        let Some(metadata) = metadata.filter(|m| !m.is_empty()) else {
            return;
        };
        for variant in key.cascade() {
            self.entries
                .entry(variant)
                .or_insert_with(|| metadata.clone());
        }
    }

    pub fn lookup(&self, operation: &Operation) -> Option<&Metadata> {
        LegKey::for_operation(operation)
            .cascade()
            .iter()
            .find_map(|key| self.entries.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a reconciliation pass filled in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackReport {
    pub transaction_filled: bool,
    pub operations_filled: usize,
}

impl FallbackReport {
    pub fn total(&self) -> usize {
        self.operations_filled + usize::from(self.transaction_filled)
    }
}

/// Fill empty operation metadata from the body's legs. Returns how many
/// operations were filled.
pub fn reconcile_operations(
    body: &TransactionBody,
    status: TransactionStatus,
    operations: &mut [Operation],
) -> usize {
    if operations.iter().all(|op| !op.metadata.is_empty()) || !body.has_legs() {
        return 0;
    }

    let index = LegIndex::from_body(body, status);
    if index.is_empty() {
        return 0;
    }

    let mut filled = 0;
    for operation in operations.iter_mut().filter(|op| op.metadata.is_empty()) {
        if let Some(metadata) = index.lookup(operation) {
            operation.metadata = metadata.clone();
            filled += 1;
        }
    }
    filled
}

/// Fill a transaction's empty metadata maps from its stored request body
pub fn reconcile_transaction(transaction: &mut Transaction) -> FallbackReport {
    let Transaction {
        body,
        status,
        metadata,
        operations,
        ..
    } = transaction;
    let Some(body) = body.as_ref() else {
        return FallbackReport::default();
    };

    let mut report = FallbackReport::default();
    if metadata.is_empty()
        && let Some(original) = body.metadata.as_ref().filter(|m| !m.is_empty())
    {
        *metadata = original.clone();
        report.transaction_filled = true;
    }
    report.operations_filled = reconcile_operations(body, *status, operations);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use tally_common::{Distribute, Source, Transfer};
    use uuid::Uuid;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn body(from: Vec<Leg>, to: Vec<Leg>, pending: bool) -> TransactionBody {
        TransactionBody {
            chart_of_accounts_group_name: None,
            description: None,
            code: None,
            pending,
            route: None,
            metadata: Some(metadata(json!({"origin": "api"}))),
            send: Transfer {
                asset: "USD".to_string(),
                value: Decimal::from(100),
                source: Source { remaining: None, from },
                distribute: Distribute { remaining: None, to },
            },
        }
    }

    fn transaction(status: TransactionStatus, body: TransactionBody) -> Transaction {
        Transaction::new(Uuid::new_v4(), Uuid::new_v4(), status, "USD").with_body(body)
    }

    #[test]
    fn test_normalize_alias() {
        assert_eq!(normalize_alias("@alice"), "@alice");
        assert_eq!(normalize_alias("@alice#savings"), "@alice");
        assert_eq!(normalize_alias("0#@alice#savings"), "@alice");
        assert_eq!(normalize_alias("a#b#c#d"), "b");
        assert_eq!(normalize_alias(""), "");
    }

    #[test]
    fn test_fills_operations_from_legs() {
        let source = Leg::new("@alice").with_metadata(metadata(json!({"side": "source"})));
        let destination = Leg::new("@bob").with_metadata(metadata(json!({"side": "destination"})));
        let mut tx = transaction(TransactionStatus::Approved, body(vec![source], vec![destination], false));
        tx.operations = vec![
            Operation::new(&tx, OperationType::Debit, "@alice"),
            Operation::new(&tx, OperationType::Credit, "@bob"),
        ];

        let report = reconcile_transaction(&mut tx);

        assert!(report.transaction_filled);
        assert_eq!(report.operations_filled, 2);
        assert_eq!(report.total(), 3);
        assert_eq!(tx.metadata["origin"], "api");
        assert_eq!(tx.operations[0].metadata["side"], "source");
        assert_eq!(tx.operations[1].metadata["side"], "destination");
    }

    #[test]
    fn test_existing_metadata_is_never_overwritten() {
        let source = Leg::new("@alice").with_metadata(metadata(json!({"side": "source"})));
        let destination = Leg::new("@bob").with_metadata(metadata(json!({"side": "destination"})));
        let mut tx = transaction(TransactionStatus::Approved, body(vec![source], vec![destination], false));
        tx.metadata = metadata(json!({"indexed": true}));
        tx.operations = vec![
            Operation::new(&tx, OperationType::Debit, "@alice")
                .with_metadata(metadata(json!({"indexed": true}))),
            Operation::new(&tx, OperationType::Credit, "@bob"),
        ];

        let report = reconcile_transaction(&mut tx);

        assert!(!report.transaction_filled);
        assert_eq!(report.operations_filled, 1);
        assert_eq!(tx.metadata, metadata(json!({"indexed": true})));
        assert_eq!(tx.operations[0].metadata, metadata(json!({"indexed": true})));
        assert_eq!(tx.operations[1].metadata["side"], "destination");
    }

    #[test]
    fn test_transaction_without_body_is_untouched() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), TransactionStatus::Approved, "USD");
        tx.operations = vec![Operation::new(&tx, OperationType::Debit, "@alice")];
        let before = tx.clone();

        assert_eq!(reconcile_transaction(&mut tx), FallbackReport::default());
        assert_eq!(tx, before);
    }

    #[test]
    fn test_degraded_keys_and_first_writer() {
        let first = Leg::new("@acct")
            .with_balance_key("k1")
            .with_route("r1")
            .with_metadata(metadata(json!({"leg": 1})));
        let second = Leg::new("@acct")
            .with_balance_key("k1")
            .with_route("r2")
            .with_metadata(metadata(json!({"leg": 2})));
        let tx = transaction(TransactionStatus::Approved, body(vec![first, second], Vec::new(), false));
        let index = LegIndex::from_body(tx.body.as_ref().unwrap(), tx.status);

        let lookup = |key: &str, route: Option<&str>| {
            let mut op = Operation::new(&tx, OperationType::Debit, "@acct").with_balance_key(key);
            op.route = route.map(str::to_string);
            index.lookup(&op).map(|m| m["leg"].clone())
        };

        // exact keys
        assert_eq!(lookup("k1", Some("r1")), Some(json!(1)));
        assert_eq!(lookup("k1", Some("r2")), Some(json!(2)));
        // route dropped: both legs share it, the first keeps it
        assert_eq!(lookup("k1", Some("r9")), Some(json!(1)));
        assert_eq!(lookup("k1", None), Some(json!(1)));
        // balance key dropped
        assert_eq!(lookup("k9", Some("r2")), Some(json!(2)));
        // both dropped
        assert_eq!(lookup("k9", Some("r9")), Some(json!(1)));

        // other types and aliases never match
        let credit = Operation::new(&tx, OperationType::Credit, "@acct").with_balance_key("k1");
        assert!(index.lookup(&credit).is_none());
        let other = Operation::new(&tx, OperationType::Debit, "@other");
        assert!(index.lookup(&other).is_none());
    }

    #[test]
    fn test_leg_alias_with_balance_key_suffix() {
        let source = Leg::new("@alice#savings")
            .with_balance_key("savings")
            .with_metadata(metadata(json!({"from": "savings"})));
        let mut tx = transaction(TransactionStatus::Approved, body(vec![source], Vec::new(), false));
        tx.operations = vec![
            Operation::new(&tx, OperationType::Debit, "@alice").with_balance_key("savings"),
        ];

        assert_eq!(reconcile_transaction(&mut tx).operations_filled, 1);
        assert_eq!(tx.operations[0].metadata["from"], "savings");
    }

    #[test]
    fn test_empty_balance_key_matches_default() {
        let source = Leg::new("@alice").with_metadata(metadata(json!({"k": "v"})));
        let mut tx = transaction(TransactionStatus::Approved, body(vec![source], Vec::new(), false));
        tx.operations = vec![Operation::new(&tx, OperationType::Debit, "@alice").with_balance_key("")];

        assert_eq!(reconcile_transaction(&mut tx).operations_filled, 1);
    }

    fn source_types_for(pending: bool, status: TransactionStatus) -> Vec<OperationType> {
        let mut types = source_types(pending, status);
        types.sort();
        types
    }

    #[test]
    fn test_source_types_by_lifecycle() {
        use OperationType::{Debit, OnHold, Release};
        use TransactionStatus::{Approved, Canceled, Created, Pending};

        assert_eq!(source_types_for(false, Approved), vec![Debit]);
        assert_eq!(source_types_for(false, Created), vec![Debit]);
        assert_eq!(source_types_for(true, Pending), vec![OnHold]);
        assert_eq!(source_types_for(true, Approved), vec![Debit, OnHold]);
        assert_eq!(source_types_for(true, Canceled), vec![OnHold, Release]);
    }

    #[test]
    fn test_pending_canceled_transaction_fills_hold_and_release() {
        let source = Leg::new("@alice").with_metadata(metadata(json!({"hold": true})));
        let destination = Leg::new("@bob").with_metadata(metadata(json!({"credit": true})));
        let mut tx = transaction(TransactionStatus::Canceled, body(vec![source], vec![destination], true));
        tx.operations = vec![
            Operation::new(&tx, OperationType::OnHold, "@alice"),
            Operation::new(&tx, OperationType::Release, "@alice"),
            Operation::new(&tx, OperationType::Debit, "@alice"),
        ];

        let report = reconcile_transaction(&mut tx);

        assert_eq!(report.operations_filled, 2);
        assert_eq!(tx.operations[0].metadata["hold"], true);
        assert_eq!(tx.operations[1].metadata["hold"], true);
        assert!(tx.operations[2].metadata.is_empty());
    }

    #[test]
    fn test_legs_without_metadata_register_nothing() {
        let tx = transaction(
            TransactionStatus::Approved,
            body(vec![Leg::new("@alice")], vec![Leg::new("@bob")], false),
        );
        assert!(LegIndex::from_body(tx.body.as_ref().unwrap(), tx.status).is_empty());
    }
}
