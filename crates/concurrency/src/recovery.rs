//! Recovery: rebuild the log from the WAL
//!
//! ## Recovery Procedure
//!
//! 1. Open the WAL, discarding a torn final record
//! 2. Apply every `Transaction` record in file order
//! 3. Advance the head at every `Checkpoint` record
//! 4. Hand back the rebuilt log and a writer positioned at the end
//!
//! Replay never re-runs validation: the WAL holds commit decisions, not
//! requests. Transaction ids are preserved exactly.

use std::path::PathBuf;

use tracing::info;

use freezer_core::{FreezerResult, TxId};
use freezer_durability::{DurabilityMode, WalRecord, WalWriter};
use freezer_storage::LogStore;

/// Coordinates log recovery on open
#[derive(Debug)]
pub struct RecoveryCoordinator {
    wal_path: PathBuf,
    mode: DurabilityMode,
}

impl RecoveryCoordinator {
    /// Recover from the WAL at `wal_path`; the returned writer uses `mode`
    pub fn new(wal_path: PathBuf, mode: DurabilityMode) -> Self {
        Self { wal_path, mode }
    }

    /// Replay the WAL into a fresh log
    pub fn recover(&self) -> FreezerResult<RecoveryResult> {
        let (wal, contents) = WalWriter::open(&self.wal_path, self.mode)?;

        let log = LogStore::new();
        let mut stats = RecoveryStats {
            discarded_bytes: contents.discarded_bytes,
            ..RecoveryStats::default()
        };

        for record in contents.records {
            match record {
                WalRecord::Transaction(txn) => {
                    stats.facts_replayed += txn.facts.len();
                    stats.keys_replayed += txn.keys.len();
                    log.apply(txn)?;
                    stats.txns_replayed += 1;
                }
                WalRecord::Checkpoint(cp) => {
                    log.advance_to(cp.head)?;
                    stats.checkpoints += 1;
                }
            }
        }
        stats.final_tx = log.head();

        info!(
            target: "freezer::db",
            path = %self.wal_path.display(),
            txns = stats.txns_replayed,
            facts = stats.facts_replayed,
            head = %stats.final_tx,
            "Recovered log from WAL"
        );

        Ok(RecoveryResult { log, wal, stats })
    }
}

/// Result of recovery
#[derive(Debug)]
pub struct RecoveryResult {
    /// Log with every committed transaction applied
    pub log: LogStore,
    /// Writer appending after the last complete record
    pub wal: WalWriter,
    /// What recovery did
    pub stats: RecoveryStats,
}

/// Statistics from recovery
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Transaction records applied
    pub txns_replayed: usize,
    /// Checkpoint records applied
    pub checkpoints: usize,
    /// Facts applied, adds and retracts alike
    pub facts_replayed: usize,
    /// Key registrations applied
    pub keys_replayed: usize,
    /// Bytes of torn tail discarded
    pub discarded_bytes: u64,
    /// Head after recovery
    pub final_tx: TxId,
}
