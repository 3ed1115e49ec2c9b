//! Write-ahead log for committed transactions
//!
//! The WAL is a single append-only file of framed records (see
//! [`crate::encoding`]). Every committed transaction is appended before it
//! becomes visible; replaying the file in order rebuilds the log.
//!
//! # Durability Modes
//!
//! - `Strict` - fsync after every append
//! - `Batched` - fsync after `batch_size` appends or `interval_ms`, whichever
//!   comes first, and again on flush and drop (DEFAULT)
//!
//! A cache store has no WAL at all; that choice is made by the caller.
//!
//! # Torn tails
//!
//! A crash can leave the final record partially written. On open the partial
//! record is discarded and the file is truncated back to the last complete
//! record. A damaged record followed by further data is corruption and fails
//! the open.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use freezer_core::{FreezerError, FreezerResult, Transaction, TxId};

use crate::encoding::{decode_record, encode_record, Decoded};

/// Name of the WAL file inside a store directory
pub const WAL_FILE_NAME: &str = "freezer.wal";

// ============================================================================
// Records
// ============================================================================

/// Marker written at the end of a rewritten log
///
/// Compaction may drop the newest transactions entirely. The checkpoint
/// carries the head forward so numbering continues where it left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Head transaction id at the time of the rewrite
    pub head: TxId,
    /// When the rewrite happened
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint at `head`, stamped now
    pub fn new(head: TxId) -> Self {
        Self {
            head,
            timestamp: Utc::now(),
        }
    }
}

/// One entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// A committed transaction
    Transaction(Transaction),
    /// Head marker from a rewrite
    Checkpoint(Checkpoint),
}

impl WalRecord {
    /// Transaction id this record brings the log to
    pub fn tx_id(&self) -> TxId {
        match self {
            WalRecord::Transaction(txn) => txn.tx_id,
            WalRecord::Checkpoint(cp) => cp.head,
        }
    }
}

// ============================================================================
// Durability Mode
// ============================================================================

/// When appended records are forced to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// fsync after every commit
    Strict,

    /// fsync every N commits OR every T milliseconds
    ///
    /// May lose up to batch_size commits or interval_ms of commits on a
    /// machine crash. A process crash loses nothing.
    Batched {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum appends between fsyncs
        batch_size: usize,
    },
}

impl Default for DurabilityMode {
    fn default() -> Self {
        // Default: batched with 100ms interval or 1000 commits
        DurabilityMode::Batched {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Everything recovered from a WAL file
#[derive(Debug, Default)]
pub struct WalContents {
    /// Complete records in file order
    pub records: Vec<WalRecord>,
    /// Bytes occupied by complete records
    pub valid_len: u64,
    /// Bytes of torn tail that were discarded
    pub discarded_bytes: u64,
}

/// Read and validate every record in `path`
///
/// A missing file reads as empty.
pub fn read_wal(path: &Path) -> FreezerResult<WalContents> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalContents::default()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < buf.len() {
        match decode_record(&buf[offset..])? {
            Decoded::Record(record, len) => {
                records.push(record);
                offset += len;
            }
            Decoded::Truncated => break,
            Decoded::ChecksumMismatch { len } => {
                if offset + len < buf.len() {
                    return Err(FreezerError::corruption(format!(
                        "checksum mismatch in {} at offset {}",
                        path.display(),
                        offset
                    )));
                }
                // Damaged final record: same as a torn write
                break;
            }
        }
    }

    Ok(WalContents {
        records,
        valid_len: offset as u64,
        discarded_bytes: (buf.len() - offset) as u64,
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Append handle on the WAL file
///
/// Records are encoded into a single buffer and written with one call, so
/// there is nothing to flush between appends. A failed append truncates the
/// file back to where the record started, leaving the WAL as it was.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Current file length (offset of the next record)
    offset: u64,
    mode: DurabilityMode,
    last_fsync: Instant,
    writes_since_fsync: usize,
    /// Set when a failed append could not be rolled back
    broken: bool,
}

impl std::fmt::Debug for WalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalWriter")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("mode", &self.mode)
            .field("broken", &self.broken)
            .finish()
    }
}

impl WalWriter {
    /// Open (or create) the WAL at `path` and read its contents
    ///
    /// Creates parent directories if they don't exist. A torn tail is cut
    /// off before the writer is returned, so new records follow the last
    /// complete one.
    pub fn open<P: AsRef<Path>>(path: P, mode: DurabilityMode) -> FreezerResult<(Self, WalContents)> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = read_wal(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        if contents.discarded_bytes > 0 {
            warn!(
                target: "freezer::wal",
                path = %path.display(),
                discarded = contents.discarded_bytes,
                "Discarding torn record at end of WAL"
            );
            file.set_len(contents.valid_len)?;
            file.sync_all()?;
        }

        let writer = Self::from_file(path, file, contents.valid_len, mode)?;
        Ok((writer, contents))
    }

    /// Wrap an already-open file whose valid length is `offset`
    pub(crate) fn from_file(
        path: PathBuf,
        mut file: File,
        offset: u64,
        mode: DurabilityMode,
    ) -> FreezerResult<Self> {
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            path,
            file,
            offset,
            mode,
            last_fsync: Instant::now(),
            writes_since_fsync: 0,
            broken: false,
        })
    }

    /// Append a record, syncing according to the durability mode
    ///
    /// Returns the offset where the record was written. On error the file
    /// is left exactly as it was before the call.
    pub fn append(&mut self, record: &WalRecord) -> FreezerResult<u64> {
        if self.broken {
            return Err(FreezerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "WAL is unusable after a failed rollback",
            )));
        }

        let encoded = encode_record(record)?;
        let offset = self.offset;

        if let Err(e) = self.file.write_all(&encoded) {
            self.rollback(offset);
            return Err(e.into());
        }
        self.offset += encoded.len() as u64;

        let synced = match self.mode {
            DurabilityMode::Strict => self.fsync(),
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_fsync += 1;
                let elapsed = self.last_fsync.elapsed().as_millis() as u64;
                if elapsed >= interval_ms || self.writes_since_fsync >= batch_size {
                    self.fsync()
                } else {
                    Ok(())
                }
            }
        };
        if let Err(e) = synced {
            self.rollback(offset);
            return Err(e);
        }

        Ok(offset)
    }

    /// Force everything appended so far to disk
    pub fn fsync(&mut self) -> FreezerResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        self.writes_since_fsync = 0;
        self.last_fsync = Instant::now();
        Ok(())
    }

    /// Flush and sync pending batched writes
    pub fn flush(&mut self) -> FreezerResult<()> {
        if self.writes_since_fsync > 0 {
            self.fsync()?;
        }
        Ok(())
    }

    fn rollback(&mut self, offset: u64) {
        let restored = self
            .file
            .set_len(offset)
            .and_then(|_| self.file.seek(SeekFrom::Start(offset)).map(|_| ()));
        match restored {
            Ok(()) => {
                self.offset = offset;
                debug!(target: "freezer::wal", offset, "Rolled back failed append");
            }
            Err(e) => {
                self.broken = true;
                warn!(
                    target: "freezer::wal",
                    path = %self.path.display(),
                    error = %e,
                    "Could not roll back failed append; WAL closed for writing"
                );
            }
        }
    }

    /// Current file size (offset of the next record)
    pub fn size(&self) -> u64 {
        self.offset
    }

    /// WAL file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability mode
    pub fn durability_mode(&self) -> DurabilityMode {
        self.mode
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        // Final fsync so batched commits survive a clean shutdown
        if !self.broken {
            let _ = self.fsync();
        }
    }
}
