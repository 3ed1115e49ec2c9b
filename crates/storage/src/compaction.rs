//! Log compaction planning
//!
//! Computes the smallest log that reconstructs the same current state:
//!
//! 1. Walk every fact chain at the head and collect the add entries that
//!    are still asserted, identified by (tx_id, seq)
//! 2. Walk the transactions in order, keeping every key registration and
//!    every surviving add; all retractions and superseded adds are dropped
//! 3. Drop transactions left with nothing in them
//!
//! Surviving facts keep their original transaction id and timestamp, and
//! the head is carried over, so numbering stays monotonic after the rewrite.
//!
//! # Key Invariants
//!
//! - **Semantically equivalent**: every (entity, key) has the same asserted
//!   values, in the same order, before and after
//! - **Idempotent**: compacting a compacted log yields the same log
//! - **Pure**: planning never touches the source log

use freezer_core::{FreezerResult, Transaction, TxId};
use rustc_hash::FxHashSet;

use crate::log_store::LogStore;

/// A compacted copy of the log, ready to replace the original
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// Head of the source log, preserved by the rewrite
    pub head: TxId,
    /// Retained transactions in commit order
    pub transactions: Vec<Transaction>,
    /// Transactions in the source log
    pub transactions_before: usize,
    /// Facts in the source log
    pub facts_before: usize,
}

impl CompactionPlan {
    /// Plan the compaction of `store` at its current head
    pub fn build(store: &LogStore) -> Self {
        let head = store.head();

        let mut surviving: FxHashSet<(TxId, u32)> = FxHashSet::default();
        store.index().for_each_chain(|_, _, chain| {
            for entry in chain.asserted_at(head) {
                surviving.insert((entry.tx_id, entry.seq));
            }
        });

        let source = store.transactions();
        let transactions_before = source.len();
        let facts_before = source.iter().map(|t| t.facts.len()).sum();

        let transactions = source
            .iter()
            .filter_map(|txn| {
                let facts: Vec<_> = txn
                    .facts
                    .iter()
                    .enumerate()
                    .filter(|(seq, _)| surviving.contains(&(txn.tx_id, *seq as u32)))
                    .map(|(_, fact)| fact.clone())
                    .collect();
                let kept = Transaction {
                    tx_id: txn.tx_id,
                    timestamp: txn.timestamp,
                    keys: txn.keys.clone(),
                    facts,
                };
                (!kept.is_empty()).then_some(kept)
            })
            .collect();

        Self {
            head,
            transactions,
            transactions_before,
            facts_before,
        }
    }

    /// Transactions retained by the plan
    pub fn transactions_after(&self) -> usize {
        self.transactions.len()
    }

    /// Facts retained by the plan
    pub fn facts_after(&self) -> usize {
        self.transactions.iter().map(|t| t.facts.len()).sum()
    }

    /// Whether the plan removes anything
    pub fn reclaims_anything(&self) -> bool {
        self.transactions_after() < self.transactions_before || self.facts_after() < self.facts_before
    }

    /// Build the replacement log
    pub fn to_store(&self) -> FreezerResult<LogStore> {
        LogStore::from_transactions(self.transactions.iter().cloned(), self.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freezer_core::{EntityId, Fact, KeyDef, SnapshotView, Value, ValueType};
    use std::sync::Arc;

    fn populated() -> (Arc<LogStore>, EntityId) {
        let log = Arc::new(LogStore::new());
        let id = EntityId::new();
        log.apply(Transaction::new(
            TxId::new(1),
            vec![
                KeyDef::new("name", ValueType::String, false),
                KeyDef::new("tag", ValueType::String, true),
            ],
            vec![Fact::add(id, "name", Value::from("Alice"))],
        ))
        .unwrap();
        log.apply(Transaction::new(
            TxId::new(2),
            vec![],
            vec![
                Fact::retract(id, "name", Value::from("Alice")),
                Fact::add(id, "name", Value::from("Bob")),
                Fact::add(id, "tag", Value::from("x")),
            ],
        ))
        .unwrap();
        log.apply(Transaction::new(
            TxId::new(3),
            vec![],
            vec![Fact::add(id, "tag", Value::from("y"))],
        ))
        .unwrap();
        log.apply(Transaction::new(
            TxId::new(4),
            vec![],
            vec![Fact::retract(id, "tag", Value::from("y"))],
        ))
        .unwrap();
        (log, id)
    }

    #[test]
    fn test_plan_drops_superseded_history() {
        let (log, id) = populated();
        let plan = CompactionPlan::build(&log);

        assert_eq!(plan.head, TxId::new(4));
        assert_eq!(plan.transactions_before, 4);
        assert_eq!(plan.facts_before, 6);
        // tx1 keeps its key registrations, tx2 keeps Bob and x
        assert_eq!(plan.transactions_after(), 2);
        assert_eq!(plan.facts_after(), 2);
        assert!(plan.reclaims_anything());

        let compacted = Arc::new(plan.to_store().unwrap());
        let snap = compacted.snapshot();
        assert_eq!(snap.tx_id(), TxId::new(4));
        assert_eq!(snap.value(id, "name"), Some(Value::from("Bob")));
        assert_eq!(snap.values(id, "tag"), vec![Value::from("x")]);
        assert!(snap.key("name").is_some());
    }

    #[test]
    fn test_plan_is_idempotent() {
        let (log, _) = populated();
        let once = CompactionPlan::build(&log);
        let compacted = once.to_store().unwrap();
        let twice = CompactionPlan::build(&compacted);

        assert_eq!(once.transactions, twice.transactions);
        assert_eq!(once.head, twice.head);
        assert!(!twice.reclaims_anything());
    }

    #[test]
    fn test_plan_of_empty_log() {
        let log = LogStore::new();
        let plan = CompactionPlan::build(&log);
        assert!(plan.transactions.is_empty());
        assert!(!plan.reclaims_anything());
        assert_eq!(plan.to_store().unwrap().head(), TxId::ZERO);
    }
}
