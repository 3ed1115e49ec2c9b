//! Database: read-only point-in-time view handed to readers
//!
//! A `Database` is bound to the transaction id that was published when it
//! was taken and never observes later commits. Holding one keeps the log
//! alive and blocks trim until it is dropped.

use freezer_core::{EntityId, KeyDef, SnapshotView, TxId, Value};
use freezer_storage::LogSnapshot;

/// Immutable view of the store as of one transaction
#[derive(Debug, Clone)]
pub struct Database {
    snapshot: LogSnapshot,
}

impl Database {
    pub(crate) fn new(snapshot: LogSnapshot) -> Self {
        Self { snapshot }
    }

    /// Transaction this view is bound to
    pub fn tx_id(&self) -> TxId {
        self.snapshot.tx_id()
    }

    /// The asserted value of a non-collection key, or the first asserted
    /// value of a collection key
    pub fn value(&self, id: EntityId, key: &str) -> Option<Value> {
        self.snapshot.value(id, key)
    }

    /// Every asserted value for (id, key), in assertion order
    pub fn values(&self, id: EntityId, key: &str) -> Vec<Value> {
        self.snapshot.values(id, key)
    }

    /// Definition of `name` as of this view
    pub fn key(&self, name: &str) -> Option<KeyDef> {
        self.snapshot.key(name)
    }

    /// Every key registered as of this view, ordered by name
    pub fn keys(&self) -> Vec<KeyDef> {
        self.snapshot.keys()
    }

    /// Entities with at least one asserted value, sorted
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.snapshot.entity_ids()
    }

    /// Keys holding at least one asserted value for `id`, sorted
    pub fn keys_of(&self, id: EntityId) -> Vec<String> {
        self.snapshot.keys_of(id)
    }

    /// Whether `id` has any asserted value
    pub fn contains(&self, id: EntityId) -> bool {
        self.snapshot.contains(id)
    }
}

impl SnapshotView for Database {
    fn tx_id(&self) -> TxId {
        self.snapshot.tx_id()
    }

    fn key(&self, name: &str) -> Option<KeyDef> {
        self.snapshot.key(name)
    }

    fn values(&self, id: EntityId, key: &str) -> Vec<Value> {
        self.snapshot.values(id, key)
    }

    fn contains(&self, id: EntityId) -> bool {
        self.snapshot.contains(id)
    }
}
