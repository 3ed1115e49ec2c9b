//! Durability layer for Freezer
//!
//! This crate handles everything that touches disk:
//!
//! - WAL: single-file write-ahead log with one record per committed transaction
//! - Record framing: length prefix, type tag, CRC32 trailer
//! - Durability modes: Strict and Batched (default)
//! - Crash-safe WAL rewrite for compaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding; // Record framing and checksums
pub mod rewrite; // Write-fsync-rename replacement of the WAL
pub mod wal; // WAL records, durability modes, writer and reader

pub use encoding::{decode_record, encode_record, Decoded, MAX_RECORD_SIZE};
pub use rewrite::{cleanup_stale_rewrite, rewrite_temp_path, rewrite_wal};
pub use wal::{
    read_wal, Checkpoint, DurabilityMode, WalContents, WalRecord, WalWriter, WAL_FILE_NAME,
};
