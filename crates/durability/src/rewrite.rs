//! Crash-safe WAL replacement
//!
//! Uses the write-fsync-rename pattern:
//! 1. Write every record to a temporary file (`freezer.wal.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename over the live WAL
//! 4. fsync the parent directory
//!
//! A crash before step 3 leaves the old WAL untouched and a stale temporary
//! file that [`cleanup_stale_rewrite`] removes on the next open. A crash
//! after step 3 leaves the new WAL in place.
//!
//! The append handle for the new WAL is opened on the temporary file before
//! the rename, so once the rename succeeds nothing else can fail.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use freezer_core::FreezerResult;

use crate::encoding::encode_record;
use crate::wal::{DurabilityMode, WalRecord, WalWriter};

/// Path of the temporary file used while rewriting `wal_path`
pub fn rewrite_temp_path(wal_path: &Path) -> PathBuf {
    let mut name = wal_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    wal_path.with_file_name(name)
}

/// Replace the WAL at `wal_path` with exactly `records`
///
/// On error the existing WAL is unchanged and the temporary file has been
/// removed where possible. On success the returned writer appends to the
/// new WAL.
pub fn rewrite_wal(
    wal_path: &Path,
    records: &[WalRecord],
    mode: DurabilityMode,
) -> FreezerResult<WalWriter> {
    let temp_path = rewrite_temp_path(wal_path);
    match write_and_swap(wal_path, &temp_path, records, mode) {
        Ok(writer) => Ok(writer),
        Err(e) => {
            if temp_path.is_file() {
                let _ = fs::remove_file(&temp_path);
            }
            Err(e)
        }
    }
}

fn write_and_swap(
    wal_path: &Path,
    temp_path: &Path,
    records: &[WalRecord],
    mode: DurabilityMode,
) -> FreezerResult<WalWriter> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(temp_path)?;

    let mut len = 0u64;
    for record in records {
        let encoded = encode_record(record)?;
        file.write_all(&encoded)?;
        len += encoded.len() as u64;
    }
    file.flush()?;
    file.sync_all()?;

    // Nothing fallible may follow the rename
    let writer = WalWriter::from_file(wal_path.to_path_buf(), file, len, mode)?;
    fs::rename(temp_path, wal_path)?;
    sync_parent_dir(wal_path);

    debug!(
        target: "freezer::wal",
        path = %wal_path.display(),
        records = records.len(),
        bytes = len,
        "Rewrote WAL"
    );

    Ok(writer)
}

/// fsync the directory holding `path` so a rename is durable
///
/// Failure is logged rather than returned: the rename has already happened
/// and cannot be undone.
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        warn!(
            target: "freezer::wal",
            dir = %parent.display(),
            error = %e,
            "Could not fsync directory after rename"
        );
    }
}

/// Remove a temporary file left behind by an interrupted rewrite
///
/// Returns true if one was removed.
pub fn cleanup_stale_rewrite(wal_path: &Path) -> FreezerResult<bool> {
    let temp_path = rewrite_temp_path(wal_path);
    if temp_path.is_file() {
        fs::remove_file(&temp_path)?;
        warn!(
            target: "freezer::wal",
            path = %temp_path.display(),
            "Removed stale WAL rewrite"
        );
        return Ok(true);
    }
    Ok(false)
}
