//! Core types and traits for Freezer
//!
//! This crate defines the foundational types used throughout the system:
//! - Value / ValueType: Typed datum and the six declarable types
//! - EntityId: Opaque entity identifier
//! - TxId: Monotonic transaction identifier
//! - KeyDef: Schema entry (name, type, cardinality)
//! - Fact / Transaction: The units recorded in the log
//! - FreezerError: Error type hierarchy
//! - SnapshotView: Read contract for point-in-time views

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{ErrorKind, FreezerError, FreezerResult};
pub use limits::{validate_key_name, MAX_KEY_NAME_BYTES, RESERVED_KEY_PREFIX};
pub use traits::SnapshotView;
pub use types::{EntityId, Fact, KeyDef, Polarity, Transaction, TxId};
pub use value::{Value, ValueType};
