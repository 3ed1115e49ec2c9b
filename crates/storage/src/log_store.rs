//! LogStore: the append-only transaction log and its read indices
//!
//! The log is the store's sole source of truth. Alongside the ordered list
//! of committed transactions it maintains:
//! - a schema table (key → definition, registering tx)
//! - an entity index (entity → key → fact chain)
//!
//! # Publication
//!
//! `apply()` updates every structure first and only then stores the new
//! transaction id into `visible`. Snapshots are bounded by the `visible`
//! value they captured and filter everything newer, so a reader can never
//! observe half of a transaction. That single atomic store is the only
//! synchronization point readers depend on.
//!
//! # Single writer
//!
//! `apply()` and `advance_to()` take `&self` but must be serialized by the
//! caller. The transaction manager's commit lock provides that.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use freezer_core::{EntityId, FreezerError, FreezerResult, Transaction, TxId};

use crate::index::EntityIndex;
use crate::schema::SchemaTable;
use crate::snapshot::LogSnapshot;

/// Size counters for the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogStats {
    /// Last published transaction id
    pub head: TxId,
    /// Transactions retained in the log
    pub transactions: usize,
    /// Facts retained in the log, adds and retracts alike
    pub facts: usize,
    /// Entities with any recorded history
    pub entities: usize,
    /// Registered keys
    pub keys: usize,
}

/// Append-only log with version-bounded read indices
#[derive(Debug, Default)]
pub struct LogStore {
    /// Committed transactions in commit order
    transactions: RwLock<Vec<Arc<Transaction>>>,
    /// Key definitions with the registering transaction
    schema: SchemaTable,
    /// Entity → key → fact chain
    index: EntityIndex,
    /// Last published transaction id
    visible: AtomicU64,
    /// Facts retained across all transactions
    fact_count: AtomicU64,
}

impl LogStore {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from transactions in commit order
    ///
    /// `head` is published after the last transaction, so a log whose tail
    /// was compacted away keeps its transaction numbering.
    pub fn from_transactions<I>(transactions: I, head: TxId) -> FreezerResult<Self>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let store = Self::new();
        for txn in transactions {
            store.apply(txn)?;
        }
        store.advance_to(head)?;
        Ok(store)
    }

    /// Last published transaction id
    pub fn head(&self) -> TxId {
        TxId::new(self.visible.load(Ordering::Acquire))
    }

    /// Apply a committed transaction and publish it
    ///
    /// Transaction ids must be strictly increasing. Ids may skip only when
    /// replaying a compacted log.
    pub fn apply(&self, txn: Transaction) -> FreezerResult<TxId> {
        let head = self.head();
        let tx_id = txn.tx_id;
        if tx_id <= head {
            trace!(target: "freezer::db", %tx_id, %head, "Rejected out-of-order transaction");
            return Err(FreezerError::corruption(format!(
                "transaction {} does not follow head {}",
                tx_id, head
            )));
        }

        for def in &txn.keys {
            self.schema.register(def, tx_id);
        }
        for (seq, fact) in txn.facts.iter().enumerate() {
            self.index.apply_fact(tx_id, seq as u32, fact);
        }
        self.fact_count
            .fetch_add(txn.facts.len() as u64, Ordering::Relaxed);
        self.transactions.write().push(Arc::new(txn));

        // Publication point: everything above is now visible at once
        self.visible.store(tx_id.as_u64(), Ordering::Release);
        trace!(target: "freezer::db", %tx_id, "Transaction published");
        Ok(tx_id)
    }

    /// Move the head forward without recording anything
    ///
    /// Used when replaying a compacted log whose last transactions were
    /// dropped entirely.
    pub fn advance_to(&self, head: TxId) -> FreezerResult<()> {
        let current = self.head();
        if head < current {
            return Err(FreezerError::corruption(format!(
                "checkpoint head {} is behind log head {}",
                head, current
            )));
        }
        self.visible.store(head.as_u64(), Ordering::Release);
        Ok(())
    }

    /// Take a snapshot at the current head
    pub fn snapshot(self: &Arc<Self>) -> LogSnapshot {
        LogSnapshot::new(Arc::clone(self), self.head())
    }

    /// Whether the entity appears anywhere in the retained history
    pub fn has_history(&self, id: EntityId) -> bool {
        self.index.has_history(id)
    }

    /// Committed transactions up to the current head, in order
    pub fn transactions(&self) -> Vec<Arc<Transaction>> {
        let head = self.head();
        self.transactions
            .read()
            .iter()
            .take_while(|t| t.tx_id <= head)
            .cloned()
            .collect()
    }

    /// Size counters
    pub fn stats(&self) -> LogStats {
        LogStats {
            head: self.head(),
            transactions: self.transactions.read().len(),
            facts: self.fact_count.load(Ordering::Relaxed) as usize,
            entities: self.index.entity_count(),
            keys: self.schema.len(),
        }
    }

    pub(crate) fn schema(&self) -> &SchemaTable {
        &self.schema
    }

    pub(crate) fn index(&self) -> &EntityIndex {
        &self.index
    }
}
