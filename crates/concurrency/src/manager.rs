//! Transaction manager: the single-writer critical section
//!
//! Every mutation runs while holding the manager's writer lock. Inside the
//! lock a transaction is begun against the current head, the caller's
//! routine buffers its work, and the commit sequence runs:
//!
//! ```text
//! 1. mark_validating()      - Active → Validating
//! 2. validate_transaction() - head unchanged, every fact well-typed
//! 3. IF empty: mark_committed(), no id consumed
//! 4. tx_id = head + 1
//! 5. append to WAL          - DURABILITY POINT
//! 6. log.apply()            - PUBLICATION POINT
//! 7. mark_committed()
//! ```
//!
//! A failure at steps 1-5 aborts the transaction and leaves both the WAL
//! and the published log as they were. Since ids are allocated only at
//! step 4 and only by the lock holder, readers never see a gap.
//!
//! # Reentrancy
//!
//! The lock is not reentrant. A routine that tries to start another
//! mutation on the same manager gets `InvalidArgument` instead of a
//! deadlock.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tracing::{debug, error};

use freezer_core::{FreezerError, FreezerResult, TxId};
use freezer_durability::{WalRecord, WalWriter};
use freezer_storage::LogStore;

use crate::transaction::{CommitError, RetractMode, TransactionContext};
use crate::validation::validate_transaction;

thread_local! {
    /// Managers whose writer lock is held by this thread
    static HELD: RefCell<SmallVec<[usize; 2]>> = RefCell::new(SmallVec::new());
}

struct WriterState {
    /// None for a cache store
    wal: Option<WalWriter>,
}

/// Serializes writers and runs the commit protocol
pub struct TransactionManager {
    writer: Mutex<WriterState>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager").finish_non_exhaustive()
    }
}

impl TransactionManager {
    /// Manager appending commits to `wal`, or to nothing for a cache store
    pub fn new(wal: Option<WalWriter>) -> Self {
        Self {
            writer: Mutex::new(WriterState { wal }),
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Enter the writer critical section
    ///
    /// Blocks until any other writer finishes. Fails if this thread already
    /// holds the lock on this manager.
    pub fn lock(&self) -> FreezerResult<WriterGuard<'_>> {
        let address = self.address();
        let nested = HELD.with(|held| held.borrow().contains(&address));
        if nested {
            return Err(FreezerError::invalid_argument(
                "nested mutation on the same transactor is not allowed",
            ));
        }

        let state = self.writer.lock();
        HELD.with(|held| held.borrow_mut().push(address));
        Ok(WriterGuard { state, address })
    }

    /// Force batched WAL writes to disk
    pub fn flush(&self) -> FreezerResult<()> {
        match self.writer.lock().wal.as_mut() {
            Some(wal) => wal.flush(),
            None => Ok(()),
        }
    }

    /// Whether commits are written to a WAL
    pub fn is_durable(&self) -> bool {
        self.writer.lock().wal.is_some()
    }
}

/// Proof of holding the writer lock
pub struct WriterGuard<'a> {
    state: MutexGuard<'a, WriterState>,
    address: usize,
}

impl std::fmt::Debug for WriterGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterGuard").finish_non_exhaustive()
    }
}

impl WriterGuard<'_> {
    /// The WAL writer, if commits are durable
    pub fn wal(&self) -> Option<&WalWriter> {
        self.state.wal.as_ref()
    }

    /// Swap in a new WAL writer, returning the old one
    ///
    /// Used after the WAL file has been rewritten in place.
    pub fn replace_wal(&mut self, wal: WalWriter) -> Option<WalWriter> {
        self.state.wal.replace(wal)
    }

    /// Begin a transaction against the current head of `log`
    pub fn begin(&self, log: &Arc<LogStore>, retract_mode: RetractMode) -> TransactionContext {
        let txn = TransactionContext::new(log.snapshot(), retract_mode);
        debug!(target: "freezer::txn", start_tx = %txn.start_tx(), "Transaction started");
        txn
    }

    /// Commit `txn` to the WAL and publish it to `log`
    ///
    /// Returns the assigned id, or `None` if the transaction recorded
    /// nothing and therefore consumed no id.
    pub fn commit(
        &mut self,
        txn: &mut TransactionContext,
        log: &LogStore,
    ) -> Result<Option<TxId>, CommitError> {
        if !txn.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot commit transaction from {:?} state - must be Active",
                txn.status
            )));
        }

        if let Some(reason) = txn.failure().map(str::to_string) {
            txn.mark_aborted(reason.clone());
            return Err(CommitError::Poisoned(reason));
        }

        txn.mark_validating()
            .map_err(|e| CommitError::InvalidState(e.to_string()))?;

        let validation = validate_transaction(txn, log);
        if !validation.is_valid() {
            txn.mark_aborted(format!("validation failed: {}", validation));
            return Err(CommitError::ValidationFailed(validation));
        }

        if txn.is_empty() {
            txn.mark_committed()
                .map_err(|e| CommitError::InvalidState(e.to_string()))?;
            debug!(target: "freezer::txn", "Empty transaction, nothing to commit");
            return Ok(None);
        }

        let tx_id = log.head().next();
        let transaction = txn.to_transaction(tx_id);

        if let Some(wal) = self.state.wal.as_mut() {
            let record = WalRecord::Transaction(transaction.clone());
            if let Err(e) = wal.append(&record) {
                txn.mark_aborted(format!("WAL write failed: {}", e));
                return Err(CommitError::Wal(e));
            }
        }

        // DURABILITY POINT passed: publish
        if let Err(e) = log.apply(transaction) {
            // Unreachable while ids come from head.next() under this lock.
            // The WAL already holds the record, so a restart replays it.
            error!(
                target: "freezer::txn",
                tx_id = %tx_id,
                error = %e,
                "Publication failed after WAL append - will be recovered on restart"
            );
            txn.mark_aborted(e.to_string());
            return Err(CommitError::InvalidState(e.to_string()));
        }

        txn.mark_committed()
            .map_err(|e| CommitError::InvalidState(e.to_string()))?;
        Ok(Some(tx_id))
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        let address = self.address;
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().position(|a| *a == address) {
                held.swap_remove(pos);
            }
        });
    }
}
