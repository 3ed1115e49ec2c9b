//! Freezer - embedded schema-aware append-only fact store
//!
//! Freezer records facts of the form (entity, key, value) in an
//! append-only transaction log. Keys are registered with a value type and
//! a collection flag before use; every write is validated against them.
//!
//! # Quick Start
//!
//! ```no_run
//! use freezer::{Store, ValueType};
//!
//! # fn main() -> freezer::FreezerResult<()> {
//! let store = Store::open("./my-data")?;
//! let tx = store.transactor();
//!
//! tx.add_key("name", ValueType::String, false)?;
//! let id = tx.generate_new_id();
//! tx.add_value("Alice", "name", id)?;
//!
//! let db = store.current_database();
//! assert_eq!(db.value(id, "name"), Some("Alice".into()));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `freezer-core`: values, facts, transactions, errors
//! - `freezer-storage`: the in-memory log and its indexes
//! - `freezer-durability`: the write-ahead log
//! - `freezer-concurrency`: transaction validation, commit and recovery
//! - `freezer-engine`: `Store`, `Transactor`, `Database`, trim
//!
//! Only the types needed to use a store are re-exported here.

pub use freezer_core::{
    EntityId, ErrorKind, Fact, FreezerError, FreezerResult, KeyDef, Polarity, SnapshotView,
    Transaction, TxId, Value, ValueType,
};
pub use freezer_engine::{
    ChangeSession, Database, ExclusiveAccess, FreezerConfig, SingleIdSession, Store,
    TransactionMetrics, Transactor, TrimReport,
};
pub use freezer_storage::LogStats;
