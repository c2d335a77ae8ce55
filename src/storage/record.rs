//! Record codec
//!
//! Encodes and decodes the 4-byte length prefix framing every record in the
//! data file.
//!
//! ## Prefix Format
//! ```text
//! ┌──────────────────────────┬──────────────────────────────┐
//! │ Prefix: i32 BE (4)       │ Payload (|length| bytes)     │
//! └──────────────────────────┴──────────────────────────────┘
//!
//!   prefix >= 0  : live record, payload is `prefix` bytes of value
//!   prefix <  0  : free block, `!prefix` unused bytes follow
//! ```

use crate::error::{ChestError, Result};

/// Size of the length prefix in bytes
pub const PREFIX_SIZE: u64 = 4;

/// Largest payload a prefix can describe
pub const MAX_PAYLOAD_SIZE: u32 = i32::MAX as u32;

/// Decoded record prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHeader {
    /// A live record holding `len` value bytes
    Live(u32),

    /// A free block of `size` unused bytes
    Free(u32),
}

impl RecordHeader {
    /// Payload size, regardless of liveness
    pub fn size(&self) -> u32 {
        match *self {
            RecordHeader::Live(len) => len,
            RecordHeader::Free(size) => size,
        }
    }

    /// Total span on disk, prefix included
    pub fn span(&self) -> u64 {
        PREFIX_SIZE + self.size() as u64
    }

    pub fn is_free(&self) -> bool {
        matches!(self, RecordHeader::Free(_))
    }
}

/// Check that a value can be framed and return its length as a prefix value
pub fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            ChestError::InvalidArgument(format!(
                "value of {} bytes exceeds the maximum record size of {} bytes",
                len, MAX_PAYLOAD_SIZE
            ))
        })
}

/// Encode the prefix of a live record
pub fn encode_live(len: u32) -> [u8; 4] {
    debug_assert!(len <= MAX_PAYLOAD_SIZE);
    (len as i32).to_be_bytes()
}

/// Encode the prefix of a free block (bitwise complement of the size)
pub fn encode_free(size: u32) -> [u8; 4] {
    debug_assert!(size <= MAX_PAYLOAD_SIZE);
    (!(size as i32)).to_be_bytes()
}

/// Decode a prefix
pub fn decode(prefix: [u8; 4]) -> RecordHeader {
    let raw = i32::from_be_bytes(prefix);
    if raw >= 0 {
        RecordHeader::Live(raw as u32)
    } else {
        RecordHeader::Free(!raw as u32)
    }
}

/// Build the full on-disk image of a live record: prefix followed by payload
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = checked_len(payload.len())?;
    let mut buf = Vec::with_capacity(PREFIX_SIZE as usize + payload.len());
    buf.extend_from_slice(&encode_live(len));
    buf.extend_from_slice(payload);
    Ok(buf)
}
