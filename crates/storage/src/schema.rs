//! Schema table
//!
//! Registered keys with the transaction that registered them, so a snapshot
//! sees exactly the schema that existed at its transaction.

use freezer_core::{KeyDef, TxId};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Registered keys, ordered by name
#[derive(Debug, Default)]
pub struct SchemaTable {
    keys: RwLock<BTreeMap<String, (KeyDef, TxId)>>,
}

impl SchemaTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key registered by `tx_id`
    ///
    /// Returns false if the name was already present; the existing entry is
    /// kept because keys are immutable once registered.
    pub fn register(&self, def: &KeyDef, tx_id: TxId) -> bool {
        let mut keys = self.keys.write();
        if keys.contains_key(&def.name) {
            return false;
        }
        keys.insert(def.name.clone(), (def.clone(), tx_id));
        true
    }

    /// Definition of `name` as of `bound`
    pub fn get_at(&self, name: &str, bound: TxId) -> Option<KeyDef> {
        self.keys
            .read()
            .get(name)
            .filter(|(_, registered)| *registered <= bound)
            .map(|(def, _)| def.clone())
    }

    /// All definitions visible as of `bound`, ordered by name
    pub fn all_at(&self, bound: TxId) -> Vec<KeyDef> {
        self.keys
            .read()
            .values()
            .filter(|(_, registered)| *registered <= bound)
            .map(|(def, _)| def.clone())
            .collect()
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no key is registered
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
