//! Index image codecs
//!
//! ## Map Image (default)
//! ```text
//! ┌─────────────────┬──────────────────────────────────────────┐
//! │ Count: u64 LE   │ (Key, Offset: u64) pairs, bincode fixint │
//! └─────────────────┴──────────────────────────────────────────┘
//! ```
//! Same bytes as a bincode-serialized map, so a full image is just the
//! serialized `BTreeMap`. The count header has a fixed width, which lets an
//! incremental commit append pairs and rewrite the header in place. A key
//! that appears more than once resolves to its last pair.
//!
//! ## Fixed Rows
//! ```text
//! ┌───────────────┬──────────────────┐
//! │ Key: u32 LE   │ Offset: u32 LE   │  ... repeated, 8-byte stride
//! └───────────────┴──────────────────┘
//! ```
//! Integer keys in `0..=u32::MAX` only.

use std::collections::BTreeMap;
use std::io::Cursor;

use bincode::Options;

use crate::config::IndexFormat;
use crate::error::{ChestError, Result};
use crate::key::Key;

/// Width of the map image count header
pub const MAP_HEADER_SIZE: u64 = 8;

/// Width of one fixed row
pub const ROW_SIZE: u64 = 8;

/// A decoded index image
#[derive(Debug, Default)]
pub struct DecodedImage {
    /// Resolved mapping
    pub entries: BTreeMap<Key, u64>,

    /// Pairs physically present, duplicates included
    pub records: u64,

    /// Bytes of the buffer that belong to the image
    pub image_len: u64,
}

/// Decode a whole index file. An empty buffer is an empty index.
pub fn decode_image(format: IndexFormat, bytes: &[u8]) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Ok(DecodedImage::default());
    }
    match format {
        IndexFormat::MapImage => decode_map_image(bytes),
        IndexFormat::FixedRows => decode_rows(bytes),
    }
}

/// Encode the complete mapping
pub fn encode_image(format: IndexFormat, entries: &BTreeMap<Key, u64>) -> Result<Vec<u8>> {
    match format {
        IndexFormat::MapImage => Ok(bincode::serialize(entries)?),
        IndexFormat::FixedRows => {
            let mut buf = Vec::with_capacity(entries.len() * ROW_SIZE as usize);
            for (key, &offset) in entries {
                buf.extend_from_slice(&encode_row(key, offset)?);
            }
            Ok(buf)
        }
    }
}

/// Encode a single entry for appending
pub fn encode_entry(format: IndexFormat, key: &Key, offset: u64) -> Result<Vec<u8>> {
    match format {
        IndexFormat::MapImage => Ok(bincode::serialize(&(key, offset))?),
        IndexFormat::FixedRows => Ok(encode_row(key, offset)?.to_vec()),
    }
}

/// Count header of a map image holding `records` pairs
pub fn map_header(records: u64) -> [u8; 8] {
    records.to_le_bytes()
}

/// Check that an entry can be stored in `format`
pub fn check_entry(format: IndexFormat, key: &Key, offset: u64) -> Result<()> {
    match format {
        IndexFormat::MapImage => Ok(()),
        IndexFormat::FixedRows => encode_row(key, offset).map(|_| ()),
    }
}

// =============================================================================
// Map Image
// =============================================================================

fn decode_map_image(bytes: &[u8]) -> Result<DecodedImage> {
    let mut cursor = Cursor::new(bytes);
    // Same layout as `bincode::serialize`; the limit stops a corrupt length
    // from allocating more than the file could hold.
    let pairs: Vec<(Key, u64)> = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(bytes.len() as u64)
        .deserialize_from(&mut cursor)
        .map_err(|e| ChestError::IndexCorrupt(format!("map image does not decode: {}", e)))?;

    let records = pairs.len() as u64;
    Ok(DecodedImage {
        entries: pairs.into_iter().collect(),
        records,
        image_len: cursor.position(),
    })
}

// =============================================================================
// Fixed Rows
// =============================================================================

fn encode_row(key: &Key, offset: u64) -> Result<[u8; 8]> {
    let key = key.as_u32().ok_or_else(|| {
        ChestError::InvalidArgument(format!(
            "fixed-row index only holds integer keys in 0..={}, got {}",
            u32::MAX,
            key
        ))
    })?;
    let offset = u32::try_from(offset).map_err(|_| {
        ChestError::InvalidArgument(format!(
            "fixed-row index only addresses offsets up to {}, got {}",
            u32::MAX,
            offset
        ))
    })?;

    let mut row = [0u8; 8];
    row[0..4].copy_from_slice(&key.to_le_bytes());
    row[4..8].copy_from_slice(&offset.to_le_bytes());
    Ok(row)
}

fn decode_rows(bytes: &[u8]) -> Result<DecodedImage> {
    if bytes.len() as u64 % ROW_SIZE != 0 {
        return Err(ChestError::IndexCorrupt(format!(
            "fixed-row index is {} bytes, not a multiple of {}",
            bytes.len(),
            ROW_SIZE
        )));
    }

    let mut entries = BTreeMap::new();
    for row in bytes.chunks_exact(ROW_SIZE as usize) {
        let (key, offset) = row.split_at(4);
        let key = u32::from_le_bytes(key.try_into().map_err(short_row)?);
        let offset = u32::from_le_bytes(offset.try_into().map_err(short_row)?);
        entries.insert(Key::Int(key as i64), offset as u64);
    }

    Ok(DecodedImage {
        entries,
        records: bytes.len() as u64 / ROW_SIZE,
        image_len: bytes.len() as u64,
    })
}

fn short_row(e: std::array::TryFromSliceError) -> ChestError {
    ChestError::IndexCorrupt(format!("fixed-row index row is short: {}", e))
}
