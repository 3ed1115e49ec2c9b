//! Trim: compaction of superseded history
//!
//! Trim rewrites the log keeping only what is needed to reproduce the
//! current state: every key registration and every still-asserted add.
//! Retractions and the adds they cancelled are dropped. The head is kept,
//! so transaction ids continue from where they were.
//!
//! Trim needs [`ExclusiveAccess`], which can only be obtained through
//! `Store::exclusive(&mut self)`; no transactor or database can be alive
//! at the same time.
//!
//! # Durable stores
//!
//! The new WAL is written beside the old one and renamed over it, followed
//! by a checkpoint record carrying the head. The in-memory log is swapped
//! only after the rename succeeds, so a failure at any point leaves the
//! store exactly as it was.

use std::sync::Arc;

use tracing::{info, warn};

use freezer_core::{FreezerError, FreezerResult, TxId};
use freezer_durability::{rewrite_wal, Checkpoint, WalRecord};
use freezer_storage::CompactionPlan;

use crate::database::Store;

/// Summary of one trim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimReport {
    /// Head before and after
    pub head: TxId,
    /// Transactions before
    pub transactions_before: usize,
    /// Transactions after
    pub transactions_after: usize,
    /// Facts before
    pub facts_before: usize,
    /// Facts after
    pub facts_after: usize,
    /// WAL size before, None for a cache store
    pub wal_bytes_before: Option<u64>,
    /// WAL size after, None for a cache store
    pub wal_bytes_after: Option<u64>,
}

impl TrimReport {
    /// Whether the trim removed anything
    pub fn reclaimed(&self) -> bool {
        self.facts_after < self.facts_before || self.transactions_after < self.transactions_before
    }
}

/// Capability for administrative operations
///
/// Borrows the store mutably for its whole lifetime.
#[derive(Debug)]
pub struct ExclusiveAccess<'a> {
    store: &'a mut Store,
}

impl<'a> ExclusiveAccess<'a> {
    pub(crate) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Compact the log
    ///
    /// Fails with `TrimFailed` if the new log cannot be built or written;
    /// the store is unchanged in that case.
    pub fn trim(&mut self) -> FreezerResult<TrimReport> {
        let store = &mut *self.store;
        let plan = CompactionPlan::build(&store.log);
        let new_log = plan
            .to_store()
            .map_err(|e| FreezerError::trim_failed(format!("rebuilding log: {}", e)))?;

        let mut guard = store.coordinator.manager().lock()?;
        let wal_bytes_before = guard.wal().map(|wal| wal.size());

        let wal_bytes_after = match (guard.wal(), store.durability_mode) {
            (Some(wal), Some(mode)) => {
                let path = wal.path().to_path_buf();
                let mut records: Vec<WalRecord> = plan
                    .transactions
                    .iter()
                    .cloned()
                    .map(WalRecord::Transaction)
                    .collect();
                records.push(WalRecord::Checkpoint(Checkpoint::new(plan.head)));

                let writer = rewrite_wal(&path, &records, mode).map_err(|e| {
                    warn!(target: "freezer::trim", error = %e, "WAL rewrite failed, store unchanged");
                    FreezerError::trim_failed(format!("rewriting WAL: {}", e))
                })?;
                let size = writer.size();
                guard.replace_wal(writer);
                Some(size)
            }
            _ => None,
        };
        drop(guard);

        store.log = Arc::new(new_log);

        let report = TrimReport {
            head: plan.head,
            transactions_before: plan.transactions_before,
            transactions_after: plan.transactions_after(),
            facts_before: plan.facts_before,
            facts_after: plan.facts_after(),
            wal_bytes_before,
            wal_bytes_after,
        };
        info!(
            target: "freezer::trim",
            head = %report.head,
            transactions_before = report.transactions_before,
            transactions_after = report.transactions_after,
            facts_before = report.facts_before,
            facts_after = report.facts_after,
            "Trim complete"
        );
        Ok(report)
    }
}
