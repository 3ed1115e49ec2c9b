//! Core traits for snapshot abstraction
//!
//! `SnapshotView` is the read contract shared by the storage engine's
//! version-bounded snapshots and the transaction context's working view.

use crate::types::{EntityId, KeyDef, TxId};
use crate::value::Value;

/// Point-in-time read view of the log
///
/// Implementations are immutable: once created, a view never observes
/// commits published after its `tx_id`.
///
/// Thread safety: views must be safe to share across threads.
pub trait SnapshotView: Send + Sync {
    /// Last transaction visible to this view
    fn tx_id(&self) -> TxId;

    /// Schema entry for `name`, if registered as of this view
    fn key(&self, name: &str) -> Option<KeyDef>;

    /// All asserted values for (id, key), in assertion order
    ///
    /// Empty if nothing is asserted.
    fn values(&self, id: EntityId, key: &str) -> Vec<Value>;

    /// Whether the entity has any asserted fact
    fn contains(&self, id: EntityId) -> bool;

    /// The single asserted value for (id, key)
    ///
    /// For collection keys this is the earliest asserted instance.
    fn value(&self, id: EntityId, key: &str) -> Option<Value> {
        self.values(id, key).into_iter().next()
    }
}
