//! Engine for Freezer
//!
//! This crate ties the lower layers together behind the public surface:
//! - Store: open/cache, lock file, recovery and background flush
//! - Transactor: the single writer gateway (add_key, add_value, ...)
//! - Database: read-only views bound to one transaction
//! - Trim: compaction behind an exclusive-access capability
//!
//! The engine is the only component that knows about:
//! - The data directory layout
//! - Configuration
//! - Cross-layer coordination (log + WAL + recovery)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod database;
pub mod id_generator;
pub mod session;
pub mod snapshot;
pub mod transactor;
pub mod trim;

pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use database::{FreezerConfig, Store, CONFIG_FILE_NAME, LOCK_FILE_NAME};
pub use session::{ChangeSession, SingleIdSession};
pub use snapshot::Database;
pub use transactor::Transactor;
pub use trim::{ExclusiveAccess, TrimReport};
