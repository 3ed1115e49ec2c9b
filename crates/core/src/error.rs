//! Error types for Freezer
//!
//! Every failure surfaced by the store is a [`FreezerError`]. Lower layers
//! (WAL, commit protocol) define their own narrow error types and convert
//! into this one at the crate boundary.
//!
//! ## Propagation
//!
//! Validation errors (`InvalidKey`, `DuplicateKey`, `UnknownKey`,
//! `TypeMismatch`, `InvalidValue`, `InvalidArgument`) are always raised
//! before anything is appended to the log, so they never leave partial
//! state behind. The engine never retries on its own.

use crate::types::EntityId;
use crate::value::ValueType;
use std::io;
use thiserror::Error;

/// Result type alias for Freezer operations
pub type FreezerResult<T> = std::result::Result<T, FreezerError>;

/// Discriminant of a [`FreezerError`], useful for matching without
/// destructuring payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or malformed key name
    InvalidKey,
    /// Conflicting redefinition of an existing key
    DuplicateKey,
    /// Operation on an unregistered key
    UnknownKey,
    /// Value type disagrees with the key's declared type
    TypeMismatch,
    /// Compare-and-retract mismatch or retraction of a missing fact
    InvalidValue,
    /// Missing or unusable argument
    InvalidArgument,
    /// Caller routine signaled failure, or a session operation failed
    TransactionAborted,
    /// Compaction could not complete
    TrimFailed,
    /// Underlying persistence failure
    Io,
    /// Persisted data failed integrity checks
    Corruption,
    /// Encoding or decoding failure
    Serialization,
}

/// Error types for the Freezer store
#[derive(Debug, Error)]
pub enum FreezerError {
    /// Key name is empty or malformed
    #[error("invalid key '{name}': {reason}")]
    InvalidKey {
        /// Offending key name
        name: String,
        /// Which naming rule was violated
        reason: String,
    },

    /// Key already registered with a different definition
    #[error(
        "key '{name}' already registered as {existing_type} (collection: {existing_collection})"
    )]
    DuplicateKey {
        /// Key name
        name: String,
        /// Type the key was registered with
        existing_type: ValueType,
        /// Cardinality the key was registered with
        existing_collection: bool,
    },

    /// Key has not been registered
    #[error("unknown key '{name}'")]
    UnknownKey {
        /// Key name
        name: String,
    },

    /// Value type does not match the key's declared type
    #[error("type mismatch for key '{key}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Key name
        key: String,
        /// Declared type
        expected: ValueType,
        /// Type of the supplied value
        actual: ValueType,
    },

    /// Compare-and-retract failed: the supplied value is not currently asserted
    #[error("value for key '{key}' on {id} does not match: {reason}")]
    InvalidValue {
        /// Key name
        key: String,
        /// Entity the retraction targeted
        id: EntityId,
        /// What was found instead
        reason: String,
    },

    /// Required argument missing or unusable
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transaction was aborted and nothing was committed
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Why the transaction was aborted
        reason: String,
    },

    /// Trim could not complete; the pre-trim log is intact
    #[error("trim failed: {reason}")]
    TrimFailed {
        /// Why compaction stopped
        reason: String,
    },

    /// I/O error from the persistence layer
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data is damaged
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FreezerError {
    /// Create an `InvalidKey` error
    pub fn invalid_key(name: impl Into<String>, reason: impl Into<String>) -> Self {
        FreezerError::InvalidKey {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an `UnknownKey` error
    pub fn unknown_key(name: impl Into<String>) -> Self {
        FreezerError::UnknownKey { name: name.into() }
    }

    /// Create an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        FreezerError::InvalidArgument(msg.into())
    }

    /// Create a `TransactionAborted` error
    ///
    /// Caller routines return this to abort a transaction explicitly.
    pub fn aborted(reason: impl Into<String>) -> Self {
        FreezerError::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Create a `TrimFailed` error
    pub fn trim_failed(reason: impl Into<String>) -> Self {
        FreezerError::TrimFailed {
            reason: reason.into(),
        }
    }

    /// Create a `Corruption` error
    pub fn corruption(msg: impl Into<String>) -> Self {
        FreezerError::Corruption(msg.into())
    }

    /// Get the discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FreezerError::InvalidKey { .. } => ErrorKind::InvalidKey,
            FreezerError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            FreezerError::UnknownKey { .. } => ErrorKind::UnknownKey,
            FreezerError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            FreezerError::InvalidValue { .. } => ErrorKind::InvalidValue,
            FreezerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FreezerError::TransactionAborted { .. } => ErrorKind::TransactionAborted,
            FreezerError::TrimFailed { .. } => ErrorKind::TrimFailed,
            FreezerError::Io(_) => ErrorKind::Io,
            FreezerError::Corruption(_) => ErrorKind::Corruption,
            FreezerError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether this error was raised by validation, before any log append
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidKey
                | ErrorKind::DuplicateKey
                | ErrorKind::UnknownKey
                | ErrorKind::TypeMismatch
                | ErrorKind::InvalidValue
                | ErrorKind::InvalidArgument
        )
    }
}

impl From<bincode::Error> for FreezerError {
    fn from(e: bincode::Error) -> Self {
        FreezerError::Serialization(e.to_string())
    }
}
