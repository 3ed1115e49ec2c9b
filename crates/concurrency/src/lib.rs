//! Concurrency layer for Freezer
//!
//! This crate implements the single-writer transaction model:
//! - TransactionContext: buffered keys and facts with read-your-writes
//! - Eager operation checks plus commit-time validation
//! - TransactionManager: writer lock, id allocation, WAL-then-publish commit
//! - RecoveryCoordinator: rebuild the log from the WAL on open

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod recovery;
pub mod transaction;
pub mod validation;

pub use manager::{TransactionManager, WriterGuard};
pub use recovery::{RecoveryCoordinator, RecoveryResult, RecoveryStats};
pub use transaction::{
    CommitError, PendingOperations, RetractMode, TransactionContext, TransactionStatus,
};
pub use validation::{validate_transaction, ConflictType, ValidationResult};
