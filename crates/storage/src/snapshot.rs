//! LogSnapshot: version-bounded view of the log
//!
//! A snapshot is an `Arc` to the live log plus the transaction id that was
//! published when it was taken. Reads filter out anything newer, so creating
//! a snapshot is O(1) and it never changes afterwards.
//!
//! Holding a snapshot keeps the log alive. Trim refuses to run while any
//! snapshot exists, because compaction discards history a snapshot may
//! still be bounded by.

use std::sync::Arc;

use freezer_core::{EntityId, KeyDef, SnapshotView, TxId, Value};

use crate::log_store::LogStore;

/// Immutable point-in-time view of the log
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    store: Arc<LogStore>,
    tx_id: TxId,
}

impl LogSnapshot {
    pub(crate) fn new(store: Arc<LogStore>, tx_id: TxId) -> Self {
        Self { store, tx_id }
    }

    /// All keys registered as of this snapshot, ordered by name
    pub fn keys(&self) -> Vec<KeyDef> {
        self.store.schema().all_at(self.tx_id)
    }

    /// Entities with at least one asserted fact, sorted
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.store.index().entity_ids_at(self.tx_id)
    }

    /// Keys with at least one asserted value for `id`, sorted
    pub fn keys_of(&self, id: EntityId) -> Vec<String> {
        self.store.index().keys_of_at(id, self.tx_id)
    }
}

impl SnapshotView for LogSnapshot {
    fn tx_id(&self) -> TxId {
        self.tx_id
    }

    fn key(&self, name: &str) -> Option<KeyDef> {
        self.store.schema().get_at(name, self.tx_id)
    }

    fn values(&self, id: EntityId, key: &str) -> Vec<Value> {
        self.store.index().values_at(id, key, self.tx_id)
    }

    fn contains(&self, id: EntityId) -> bool {
        self.store.index().contains_at(id, self.tx_id)
    }
}
