//! Storage layer for Freezer
//!
//! This crate implements the log / store engine:
//! - LogStore: append-only transaction log, sole source of truth
//! - EntityIndex: per-(entity, key) fact chains for current-value lookup
//! - SchemaTable: registered keys, versioned with the log
//! - LogSnapshot: O(1) version-bounded read views
//! - CompactionPlan: superseded-history removal used by trim
//!
//! Nothing here touches disk; persistence lives in `freezer-durability`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compaction;
pub mod index;
pub mod log_store;
pub mod schema;
pub mod snapshot;

pub use compaction::CompactionPlan;
pub use index::{ChainEntry, EntityIndex, FactChain};
pub use log_store::{LogStats, LogStore};
pub use schema::SchemaTable;
pub use snapshot::LogSnapshot;
