//! Transactor: the single writer gateway
//!
//! Every mutation of the store goes through one of the operations here,
//! and each opens exactly one atomic transaction:
//!
//! | operation | transaction contents |
//! |-----------|----------------------|
//! | `add_key` | one key registration |
//! | `add_value` | one add, plus the retraction of a replaced single value |
//! | `remove_value` | compare-and-retract of one value |
//! | `add_values` | whatever the routine adds to one entity |
//! | `perform_changes` | whatever the routine does store-wide |
//!
//! All of them validate every operation before anything is appended, so a
//! failure leaves the store exactly as it was. Nothing is retried.
//!
//! # Compare-and-retract
//!
//! `remove_value` only succeeds when the supplied value is currently
//! asserted. Because it runs inside the writer's critical section, it
//! behaves as an atomic compare-and-swap at the granularity of one fact
//! and is the building block for read-modify-write:
//!
//! ```text
//! let current = db.value(id, "count");
//! transactor.perform_changes(|s| {
//!     s.remove_value(current, "count", id)?;   // fails if someone else won
//!     s.add_value(next, "count", id)
//! })?;
//! ```

use std::sync::Arc;

use freezer_concurrency::RetractMode;
use freezer_core::{EntityId, FreezerError, FreezerResult, KeyDef, TxId, Value, ValueType};
use freezer_storage::LogStore;

use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::id_generator::generate_new_id;
use crate::session::{ChangeSession, SingleIdSession};

/// Handle for mutating a store
///
/// Cheap to create; obtained from `Store::transactor()`. Any number of
/// handles may exist and be used from many threads; their transactions are
/// serialized.
#[derive(Debug, Clone, Copy)]
pub struct Transactor<'s> {
    log: &'s Arc<LogStore>,
    coordinator: &'s TransactionCoordinator,
    retract_mode: RetractMode,
}

impl<'s> Transactor<'s> {
    pub(crate) fn new(
        log: &'s Arc<LogStore>,
        coordinator: &'s TransactionCoordinator,
        retract_mode: RetractMode,
    ) -> Self {
        Self {
            log,
            coordinator,
            retract_mode,
        }
    }

    /// Register a key
    ///
    /// Re-registering an identical definition succeeds without recording
    /// anything. A different definition for an existing name fails with
    /// `DuplicateKey`; a malformed name fails with `InvalidKey`.
    pub fn add_key(&self, name: &str, value_type: ValueType, collection: bool) -> FreezerResult<()> {
        self.coordinator
            .run(self.log, self.retract_mode, |txn| {
                txn.register_key(KeyDef::new(name, value_type, collection))
            })
            .map(|_| ())
    }

    /// Fresh entity id, never seen in committed history
    pub fn generate_new_id(&self) -> EntityId {
        generate_new_id(self.log)
    }

    /// Assert `value` for (id, key)
    ///
    /// For a non-collection key the previously asserted value is retracted
    /// in the same transaction.
    pub fn add_value(&self, value: impl Into<Value>, key: &str, id: EntityId) -> FreezerResult<()> {
        let value = value.into();
        self.coordinator
            .run(self.log, self.retract_mode, |txn| txn.add(id, key, value))
            .map(|_| ())
    }

    /// Run `routine` in one transaction scoped to `id`
    ///
    /// All adds commit together or none do. An error from the routine
    /// aborts the transaction and is returned unchanged.
    pub fn add_values<T, F>(&self, id: EntityId, routine: F) -> FreezerResult<T>
    where
        F: FnOnce(&mut SingleIdSession<'_>) -> FreezerResult<T>,
    {
        if id.is_nil() {
            return Err(FreezerError::invalid_argument("entity id is missing"));
        }
        self.coordinator
            .run(self.log, self.retract_mode, |txn| {
                let mut session = SingleIdSession::new(txn, id);
                routine(&mut session)
            })
            .map(|(value, _)| value)
    }

    /// Retract `value` from (id, key) if, and only if, it is currently
    /// asserted
    ///
    /// Fails with `InvalidValue` and changes nothing otherwise.
    pub fn remove_value(&self, value: impl Into<Value>, key: &str, id: EntityId) -> FreezerResult<()> {
        let value = value.into();
        self.coordinator
            .run(self.log, self.retract_mode, |txn| txn.remove(id, key, value))
            .map(|_| ())
    }

    /// Run `routine` in one store-wide transaction
    ///
    /// Commits only if the routine returns `Ok` and none of its operations
    /// failed along the way.
    pub fn perform_changes<T, F>(&self, routine: F) -> FreezerResult<T>
    where
        F: FnOnce(&mut ChangeSession<'_>) -> FreezerResult<T>,
    {
        self.perform_changes_with_tx(routine).map(|(value, _)| value)
    }

    /// Like `perform_changes`, also returning the committed transaction id
    ///
    /// The id is `None` when the routine recorded nothing.
    pub fn perform_changes_with_tx<T, F>(&self, routine: F) -> FreezerResult<(T, Option<TxId>)>
    where
        F: FnOnce(&mut ChangeSession<'_>) -> FreezerResult<T>,
    {
        let log: &LogStore = self.log;
        self.coordinator.run(self.log, self.retract_mode, |txn| {
            let mut session = ChangeSession::new(txn, log);
            routine(&mut session)
        })
    }

    /// Transaction counters for this store
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }
}
