//! WAL record encoding and decoding
//!
//! ## Record Format
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (NOT including length itself)
//! - **type**: record tag (1 = Transaction, 2 = Checkpoint)
//! - **payload**: bincode-serialized record body
//! - **crc32**: CRC32 over \[type\]\[payload\]
//!
//! All integers are little-endian.

use crate::wal::{Checkpoint, WalRecord};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use freezer_core::{FreezerError, FreezerResult, Transaction};

/// Tag for a committed transaction
pub const TYPE_TRANSACTION: u8 = 1;
/// Tag for a compaction checkpoint
pub const TYPE_CHECKPOINT: u8 = 2;

/// Bytes in the length prefix
pub const LENGTH_PREFIX: usize = 4;
/// Smallest legal value of the length field: tag + crc
const MIN_BODY: usize = 1 + 4;
/// Largest legal value of the length field
///
/// A length beyond this can only come from a damaged prefix, never from a
/// torn append.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Outcome of decoding one record from the front of a buffer
#[derive(Debug)]
pub enum Decoded {
    /// A complete, checksum-valid record and the bytes it occupied
    Record(WalRecord, usize),
    /// The buffer ends partway through a record
    Truncated,
    /// The record is complete but its checksum does not match
    ChecksumMismatch {
        /// Bytes the damaged record claims to occupy
        len: usize,
    },
}

fn crc_of(type_tag: u8, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(payload);
    hasher.finalize()
}

/// Encode a record to bytes ready for appending
pub fn encode_record(record: &WalRecord) -> FreezerResult<Vec<u8>> {
    let (type_tag, payload) = match record {
        WalRecord::Transaction(txn) => (TYPE_TRANSACTION, bincode::serialize(txn)?),
        WalRecord::Checkpoint(cp) => (TYPE_CHECKPOINT, bincode::serialize(cp)?),
    };

    let total_len = 1 + payload.len() + 4;
    if total_len > MAX_RECORD_SIZE {
        return Err(FreezerError::Serialization(format!(
            "record of {} bytes exceeds the limit of {}",
            total_len, MAX_RECORD_SIZE
        )));
    }
    let total_len_u32 = u32::try_from(total_len).map_err(|_| {
        FreezerError::Serialization(format!("record of {} bytes is too large", total_len))
    })?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + total_len);
    buf.write_u32::<LittleEndian>(total_len_u32)?;
    buf.write_u8(type_tag)?;
    buf.extend_from_slice(&payload);
    buf.write_u32::<LittleEndian>(crc_of(type_tag, &payload))?;
    Ok(buf)
}

/// Decode the record at the front of `buf`
///
/// Unknown tags with a valid checksum are reported as corruption: this
/// build cannot safely skip records it does not understand.
pub fn decode_record(buf: &[u8]) -> FreezerResult<Decoded> {
    if buf.len() < LENGTH_PREFIX {
        return Ok(Decoded::Truncated);
    }
    let body_len = LittleEndian::read_u32(&buf[..LENGTH_PREFIX]) as usize;
    if body_len < MIN_BODY {
        return Err(FreezerError::corruption(format!(
            "record length {} is below the minimum {}",
            body_len, MIN_BODY
        )));
    }
    if body_len > MAX_RECORD_SIZE {
        return Err(FreezerError::corruption(format!(
            "record length {} exceeds the maximum {}",
            body_len, MAX_RECORD_SIZE
        )));
    }
    let total = LENGTH_PREFIX + body_len;
    if buf.len() < total {
        return Ok(Decoded::Truncated);
    }

    let body = &buf[LENGTH_PREFIX..total];
    let type_tag = body[0];
    let payload = &body[1..body_len - 4];
    let stored_crc = LittleEndian::read_u32(&body[body_len - 4..]);
    if crc_of(type_tag, payload) != stored_crc {
        return Ok(Decoded::ChecksumMismatch { len: total });
    }

    let record = match type_tag {
        TYPE_TRANSACTION => WalRecord::Transaction(bincode::deserialize::<Transaction>(payload)?),
        TYPE_CHECKPOINT => WalRecord::Checkpoint(bincode::deserialize::<Checkpoint>(payload)?),
        other => {
            return Err(FreezerError::corruption(format!(
                "unknown record type {}",
                other
            )))
        }
    };
    Ok(Decoded::Record(record, total))
}
