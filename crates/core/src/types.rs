//! Core types for Freezer
//!
//! This module defines the foundational types:
//! - EntityId: Opaque unique identifier for an entity
//! - TxId: Monotonic transaction identifier
//! - KeyDef: Schema entry (name, type, cardinality)
//! - Fact: One (entity, key, value, polarity) record
//! - Transaction: Atomic, ordered group of facts and key registrations

use crate::value::{Value, ValueType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity
///
/// A wrapper around a UUID v4. The nil UUID is never issued and is treated
/// as an absent identifier by the transactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new random EntityId using UUID v4
    ///
    /// Uniqueness against committed history is the identifier generator's
    /// job; this only draws a candidate.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil identifier, used to represent "no id"
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the nil identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Create an EntityId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse an EntityId from its string representation
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this EntityId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier
///
/// Assigned at commit time only. The first committed transaction is 1 and
/// every successful commit increments by exactly one, so readers never see
/// gaps for rolled-back work. `TxId::ZERO` is the empty log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TxId(u64);

impl TxId {
    /// Position before the first transaction
    pub const ZERO: TxId = TxId(0);

    /// Wrap a raw transaction number
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw transaction number
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The id that follows this one
    ///
    /// Exhausting the u64 space is an invariant violation, not an error.
    pub fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(n) => Self(n),
            None => panic!("transaction id space exhausted"),
        }
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Schema entry for a key
///
/// Immutable once registered: a name can never change type or cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyDef {
    /// Unique key name
    pub name: String,
    /// Declared value type
    pub value_type: ValueType,
    /// Whether an entity may hold many concurrent values for this key
    pub collection: bool,
}

impl KeyDef {
    /// Create a new key definition
    pub fn new(name: impl Into<String>, value_type: ValueType, collection: bool) -> Self {
        Self {
            name: name.into(),
            value_type,
            collection,
        }
    }

    /// Whether `other` is the same definition apart from the name
    pub fn same_shape(&self, other: &KeyDef) -> bool {
        self.value_type == other.value_type && self.collection == other.collection
    }
}

/// Whether a fact asserts or retracts a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// The value is asserted
    Add,
    /// One previously asserted instance of the value is withdrawn
    Retract,
}

/// An atomic (entity, key, value, polarity) record
///
/// Facts are never edited after commit. Correcting a value means
/// retracting the old fact and adding a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Entity the fact is about
    pub id: EntityId,
    /// Key name
    pub key: String,
    /// The value asserted or retracted
    pub value: Value,
    /// Add or retract
    pub polarity: Polarity,
}

impl Fact {
    /// Create an assertion
    pub fn add(id: EntityId, key: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            key: key.into(),
            value,
            polarity: Polarity::Add,
        }
    }

    /// Create a retraction
    pub fn retract(id: EntityId, key: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            key: key.into(),
            value,
            polarity: Polarity::Retract,
        }
    }

    /// Whether this fact asserts its value
    pub fn is_add(&self) -> bool {
        self.polarity == Polarity::Add
    }
}

/// A committed, immutable group of key registrations and facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Commit position
    pub tx_id: TxId,
    /// Wall-clock commit time
    pub timestamp: DateTime<Utc>,
    /// Keys registered by this transaction, applied before its facts
    pub keys: Vec<KeyDef>,
    /// Facts in commit order
    pub facts: Vec<Fact>,
}

impl Transaction {
    /// Create a transaction stamped with the current time
    pub fn new(tx_id: TxId, keys: Vec<KeyDef>, facts: Vec<Fact>) -> Self {
        Self {
            tx_id,
            timestamp: Utc::now(),
            keys,
            facts,
        }
    }

    /// Whether the transaction records nothing
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.facts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_unique() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn test_entity_id_nil() {
        assert!(EntityId::nil().is_nil());
        assert_eq!(EntityId::nil().as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn test_entity_id_parse_display_round_trip() {
        let id = EntityId::new();
        assert_eq!(EntityId::parse(&id.to_string()), Some(id));
        assert_eq!(EntityId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_tx_id_ordering_and_next() {
        let first = TxId::ZERO.next();
        assert_eq!(first.as_u64(), 1);
        assert!(first > TxId::ZERO);
        assert_eq!(first.next(), TxId::new(2));
        assert_eq!(TxId::new(5).to_string(), "tx#5");
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_tx_id_exhaustion_is_fatal() {
        let _ = TxId::new(u64::MAX).next();
    }

    #[test]
    fn test_key_def_same_shape() {
        let a = KeyDef::new("name", ValueType::String, false);
        let b = KeyDef::new("other", ValueType::String, false);
        let c = KeyDef::new("name", ValueType::String, true);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_fact_constructors() {
        let id = EntityId::new();
        let add = Fact::add(id, "name", Value::from("Alice"));
        let retract = Fact::retract(id, "name", Value::from("Alice"));
        assert!(add.is_add());
        assert!(!retract.is_add());
        assert_eq!(add.value, retract.value);
    }

    #[test]
    fn test_transaction_is_empty() {
        let empty = Transaction::new(TxId::new(1), vec![], vec![]);
        assert!(empty.is_empty());
        let keyed = Transaction::new(
            TxId::new(1),
            vec![KeyDef::new("k", ValueType::Integer, false)],
            vec![],
        );
        assert!(!keyed.is_empty());
    }
}
