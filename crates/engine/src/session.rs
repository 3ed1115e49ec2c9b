//! Scoped sessions handed to transactional routines
//!
//! A session is a view of the one uncommitted transaction, passed to the
//! routine by exclusive reference. Nothing a session does is visible
//! outside it until the routine returns `Ok` and the commit succeeds.
//!
//! ```text
//! store.transactor().perform_changes(|s| {
//!     s.add_key("name", ValueType::String, false)?;
//!     let id = s.generate_new_id();
//!     s.add_value("Alice", "name", id)?;
//!     Ok(id)
//! })?;
//! ```

use freezer_concurrency::{PendingOperations, TransactionContext};
use freezer_core::{EntityId, FreezerResult, KeyDef, Value, ValueType};
use freezer_storage::LogStore;

use crate::id_generator::generate_new_id;

/// Store-wide session used by `perform_changes`
pub struct ChangeSession<'t> {
    txn: &'t mut TransactionContext,
    log: &'t LogStore,
}

impl<'t> ChangeSession<'t> {
    pub(crate) fn new(txn: &'t mut TransactionContext, log: &'t LogStore) -> Self {
        Self { txn, log }
    }

    /// Register a key as part of this transaction
    ///
    /// The key is usable by later operations in the same session.
    pub fn add_key(&mut self, name: &str, value_type: ValueType, collection: bool) -> FreezerResult<()> {
        self.txn
            .register_key(KeyDef::new(name, value_type, collection))
            .map(|_| ())
    }

    /// Fresh entity id
    pub fn generate_new_id(&self) -> EntityId {
        generate_new_id(self.log)
    }

    /// Assert `value` for (id, key)
    pub fn add_value(&mut self, value: impl Into<Value>, key: &str, id: EntityId) -> FreezerResult<()> {
        self.txn.add(id, key, value.into())
    }

    /// Retract `value` from (id, key) if it is currently asserted
    pub fn remove_value(
        &mut self,
        value: impl Into<Value>,
        key: &str,
        id: EntityId,
    ) -> FreezerResult<()> {
        self.txn.remove(id, key, value.into())
    }

    /// Values for (id, key) including this session's pending changes
    pub fn values(&self, id: EntityId, key: &str) -> FreezerResult<Vec<Value>> {
        self.txn.values(id, key)
    }

    /// First value for (id, key) including this session's pending changes
    pub fn value(&self, id: EntityId, key: &str) -> FreezerResult<Option<Value>> {
        Ok(self.txn.values(id, key)?.into_iter().next())
    }

    /// Definition of `name`, including keys added in this session
    pub fn key(&self, name: &str) -> Option<KeyDef> {
        self.txn.key(name)
    }

    /// Work buffered so far
    pub fn pending(&self) -> PendingOperations {
        self.txn.pending_operations()
    }
}

/// Session bound to a single entity, used by `add_values`
pub struct SingleIdSession<'t> {
    txn: &'t mut TransactionContext,
    id: EntityId,
}

impl<'t> SingleIdSession<'t> {
    pub(crate) fn new(txn: &'t mut TransactionContext, id: EntityId) -> Self {
        Self { txn, id }
    }

    /// The entity this session writes to
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Assert `value` for `key` on this session's entity
    pub fn add_value(&mut self, value: impl Into<Value>, key: &str) -> FreezerResult<()> {
        self.txn.add(self.id, key, value.into())
    }

    /// Values for `key` including this session's pending changes
    pub fn values(&self, key: &str) -> FreezerResult<Vec<Value>> {
        self.txn.values(self.id, key)
    }

    /// First value for `key` including this session's pending changes
    pub fn value(&self, key: &str) -> FreezerResult<Option<Value>> {
        Ok(self.txn.values(self.id, key)?.into_iter().next())
    }
}
