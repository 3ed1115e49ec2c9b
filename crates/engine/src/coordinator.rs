//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - The run-routine-then-commit-or-abort sequence shared by every
//!   mutating operation
//! - Transaction metrics (started, committed, aborted)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use freezer_concurrency::{RetractMode, TransactionContext, TransactionManager};
use freezer_core::{FreezerResult, TxId};
use freezer_storage::LogStore;

/// Transaction coordinator for the store
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering: they are purely observational
/// and do not synchronize any other memory operations.
#[derive(Debug)]
pub struct TransactionCoordinator {
    /// Writer lock and commit protocol
    manager: Arc<TransactionManager>,
    /// Transactions currently running
    active_count: AtomicU64,
    /// Total transactions started
    total_started: AtomicU64,
    /// Total transactions committed (including empty ones)
    total_committed: AtomicU64,
    /// Total transactions aborted
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Wrap `manager`
    pub fn new(manager: TransactionManager) -> Self {
        Self {
            manager: Arc::new(manager),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// The underlying manager
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Run `routine` inside one transaction
    ///
    /// `Ok` from the routine requests commit; `Err` aborts and is returned
    /// unchanged. Returns the routine's value and the assigned transaction
    /// id, or `None` if nothing was recorded.
    pub fn run<T, F>(
        &self,
        log: &Arc<LogStore>,
        retract_mode: RetractMode,
        routine: F,
    ) -> FreezerResult<(T, Option<TxId>)>
    where
        F: FnOnce(&mut TransactionContext) -> FreezerResult<T>,
    {
        let mut guard = self.manager.lock()?;
        let mut txn = guard.begin(log, retract_mode);

        let _active = ActiveTransaction::enter(self);

        let outcome = match routine(&mut txn) {
            Ok(value) => match guard.commit(&mut txn, log) {
                Ok(tx_id) => {
                    self.total_committed.fetch_add(1, Ordering::Relaxed);
                    if let Some(tx_id) = tx_id {
                        let pending = txn.pending_operations();
                        debug!(
                            target: "freezer::txn",
                            tx_id = %tx_id,
                            keys = pending.keys,
                            adds = pending.adds,
                            retracts = pending.retracts,
                            elapsed_us = txn.elapsed().as_micros() as u64,
                            "Transaction committed"
                        );
                    }
                    Ok((value, tx_id))
                }
                Err(e) => {
                    self.total_aborted.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "freezer::txn", error = %e, "Commit refused");
                    Err(e.into())
                }
            },
            Err(e) => {
                txn.mark_aborted(e.to_string());
                self.total_aborted.fetch_add(1, Ordering::Relaxed);
                debug!(target: "freezer::txn", error = %e, "Transaction aborted by routine");
                Err(e)
            }
        };

        outcome
    }

    /// Force batched WAL writes to disk
    pub fn flush(&self) -> FreezerResult<()> {
        self.manager.flush()
    }

    /// Snapshot of the transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        let total_committed = self.total_committed.load(Ordering::Relaxed);
        let total_aborted = self.total_aborted.load(Ordering::Relaxed);
        let finished = total_committed + total_aborted;
        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed,
            total_aborted,
            commit_rate: if finished == 0 {
                0.0
            } else {
                total_committed as f64 / finished as f64
            },
        }
    }
}

/// Holds one slot of `active_count` for the duration of a routine
///
/// Released on drop, so a panicking routine still leaves the counters
/// consistent. A transaction unwound by a panic counts as aborted.
struct ActiveTransaction<'a> {
    coordinator: &'a TransactionCoordinator,
}

impl<'a> ActiveTransaction<'a> {
    fn enter(coordinator: &'a TransactionCoordinator) -> Self {
        coordinator.active_count.fetch_add(1, Ordering::Relaxed);
        coordinator.total_started.fetch_add(1, Ordering::Relaxed);
        Self { coordinator }
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.coordinator
                .total_aborted
                .fetch_add(1, Ordering::Relaxed);
        }
        self.coordinator
            .active_count
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Transaction metrics
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Transactions currently running
    pub active_count: u64,
    /// Total transactions started
    pub total_started: u64,
    /// Total transactions committed
    pub total_committed: u64,
    /// Total transactions aborted
    pub total_aborted: u64,
    /// Committed / (committed + aborted)
    pub commit_rate: f64,
}
