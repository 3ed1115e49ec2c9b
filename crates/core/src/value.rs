//! Value types for Freezer
//!
//! This module defines:
//! - ValueType: The fixed set of types a key can be declared with
//! - Value: Tagged union holding one datum of those types
//!
//! ## Type Rules
//!
//! - Six types only: Integer, Real, String, Blob, Date, Ref
//! - No implicit coercions: `Integer(1) != Real(1.0)`
//! - `Blob` is never equal to `String`, even with identical bytes
//! - Real uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//!
//! Blobs and dates are opaque to the store. They are kept and compared by
//! value, never interpreted.

use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a key
///
/// The numeric codes are part of the WAL format and MUST NOT change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// 64-bit signed integer
    Integer = 1,
    /// 64-bit floating point
    Real = 2,
    /// UTF-8 string
    String = 3,
    /// Opaque byte payload
    Blob = 4,
    /// Point in time (UTC)
    Date = 5,
    /// Reference to another entity
    Ref = 6,
}

impl ValueType {
    /// All value types in code order
    pub const ALL: [ValueType; 6] = [
        ValueType::Integer,
        ValueType::Real,
        ValueType::String,
        ValueType::Blob,
        ValueType::Date,
        ValueType::Ref,
    ];

    /// Stable numeric code
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a numeric code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(ValueType::Integer),
            2 => Some(ValueType::Real),
            3 => Some(ValueType::String),
            4 => Some(ValueType::Blob),
            5 => Some(ValueType::Date),
            6 => Some(ValueType::Ref),
            _ => None,
        }
    }

    /// Type name for display and error messages
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Integer => "Integer",
            ValueType::Real => "Real",
            ValueType::String => "String",
            ValueType::Blob => "Blob",
            ValueType::Date => "Date",
            ValueType::Ref => "Ref",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed datum stored against an (entity, key) pair
///
/// Values are immutable and compared structurally. Different variants are
/// never equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point (IEEE-754)
    Real(f64),
    /// UTF-8 string
    String(String),
    /// Opaque bytes
    Blob(Vec<u8>),
    /// UTC timestamp
    Date(DateTime<Utc>),
    /// Reference to another entity
    Ref(EntityId),
}

// IEEE-754 float semantics rule out deriving Eq
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// The type this value satisfies
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::String(_) => ValueType::String,
            Value::Blob(_) => ValueType::Blob,
            Value::Date(_) => ValueType::Date,
            Value::Ref(_) => ValueType::Ref,
        }
    }

    /// Whether the value is equal to itself
    ///
    /// False only for a NaN real, which could never be retracted.
    pub fn is_comparable(&self) -> bool {
        self == self
    }

    /// Get as i64 if this is an Integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Real value
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Blob value
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get the timestamp if this is a Date value
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get the referenced entity if this is a Ref value
    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Ref(id) => write!(f, "ref:{}", id),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Ref(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_type_codes_are_stable() {
        assert_eq!(ValueType::Integer.as_u8(), 1);
        assert_eq!(ValueType::Real.as_u8(), 2);
        assert_eq!(ValueType::String.as_u8(), 3);
        assert_eq!(ValueType::Blob.as_u8(), 4);
        assert_eq!(ValueType::Date.as_u8(), 5);
        assert_eq!(ValueType::Ref.as_u8(), 6);
        for t in ValueType::ALL {
            assert_eq!(ValueType::from_u8(t.as_u8()), Some(t));
        }
        assert_eq!(ValueType::from_u8(0), None);
        assert_eq!(ValueType::from_u8(7), None);
    }

    #[test]
    fn test_value_type_reporting() {
        let date = Utc.with_ymd_and_hms(2013, 10, 9, 0, 0, 0).unwrap();
        assert_eq!(Value::Integer(1).value_type(), ValueType::Integer);
        assert_eq!(Value::Real(1.5).value_type(), ValueType::Real);
        assert_eq!(Value::from("a").value_type(), ValueType::String);
        assert_eq!(Value::Blob(vec![1]).value_type(), ValueType::Blob);
        assert_eq!(Value::Date(date).value_type(), ValueType::Date);
        assert_eq!(Value::Ref(EntityId::new()).value_type(), ValueType::Ref);
    }

    #[test]
    fn test_different_variants_never_equal() {
        assert_ne!(Value::Integer(1), Value::Real(1.0));
        assert_ne!(Value::String("ab".into()), Value::Blob(b"ab".to_vec()));
    }

    #[test]
    fn test_real_ieee_equality() {
        assert_ne!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_eq!(Value::Real(-0.0), Value::Real(0.0));
        assert!(!Value::Real(f64::NAN).is_comparable());
        assert!(Value::Real(2.5).is_comparable());
    }

    #[test]
    fn test_accessors() {
        let id = EntityId::new();
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(id).as_ref_id(), Some(id));
        assert_eq!(Value::Integer(7).as_str(), None);
        assert_eq!(Value::Blob(vec![9]).as_blob(), Some(&[9u8][..]));
    }

    #[test]
    fn test_serde_round_trip_with_bincode() {
        let date = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let values = vec![
            Value::Integer(-3),
            Value::Real(0.25),
            Value::from("hello"),
            Value::Blob(vec![0, 1, 2]),
            Value::Date(date),
            Value::Ref(EntityId::new()),
        ];
        let bytes = bincode::serialize(&values).unwrap();
        let decoded: Vec<Value> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(values, decoded);
    }
}
