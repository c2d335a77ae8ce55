//! Index store
//!
//! In-memory key -> offset mapping mirrored to the index file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::IndexFormat;
use crate::error::Result;
use crate::key::Key;

use super::format::{self, MAP_HEADER_SIZE};

/// Persisted key -> offset mapping
///
/// ## Persistence
/// - `persist_full`: rewrite the whole image from offset 0 and truncate
/// - `persist_incremental`: append the pairs written since the last persist;
///   falls back to a full rewrite when a key was removed in between
///
/// The in-memory map is authoritative between persists. Nothing written
/// after the last persist survives an unclean shutdown.
pub struct IndexStore {
    path: PathBuf,
    file: File,
    format: IndexFormat,

    /// Current mapping
    entries: BTreeMap<Key, u64>,

    /// Pairs physically in the file image, duplicates included
    records: u64,

    /// Byte length of the valid image in the file
    image_len: u64,

    /// Upserts since the last persist
    pending: Vec<(Key, u64)>,

    /// A removal happened since the last persist
    needs_rewrite: bool,
}

impl IndexStore {
    /// Open or create the index file and load its image.
    ///
    /// An empty file is a fresh index; a non-empty file that fails to decode
    /// is IndexCorrupt. Bytes past the end of the decoded image (an append
    /// whose header rewrite never happened) are cut off.
    pub fn open(path: &Path, format: IndexFormat) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let image = format::decode_image(format, &bytes)?;
        if (bytes.len() as u64) > image.image_len {
            tracing::warn!(
                path = %path.display(),
                dropped = bytes.len() as u64 - image.image_len,
                "Dropping index bytes past the committed image"
            );
            file.set_len(image.image_len)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            format,
            entries: image.entries,
            records: image.records,
            image_len: image.image_len,
            pending: Vec::new(),
            needs_rewrite: false,
        })
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    /// Offset of the live record for `key`
    pub fn get(&self, key: &Key) -> Option<u64> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Check that `key` could be stored at any offset up to `max_offset`
    pub fn check_entry(&self, key: &Key, max_offset: u64) -> Result<()> {
        format::check_entry(self.format, key, max_offset)
    }

    /// Point `key` at `offset`
    pub fn insert(&mut self, key: Key, offset: u64) {
        self.entries.insert(key.clone(), offset);
        if !self.needs_rewrite {
            self.pending.push((key, offset));
        }
    }

    /// Remove `key`, returning its offset
    pub fn remove(&mut self, key: &Key) -> Option<u64> {
        let offset = self.entries.remove(key)?;
        self.needs_rewrite = true;
        self.pending.clear();
        Some(offset)
    }

    /// Keys in index order
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    /// (key, offset) pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, u64)> {
        self.entries.iter().map(|(k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if something changed since the last persist
    pub fn is_dirty(&self) -> bool {
        self.needs_rewrite || !self.pending.is_empty()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Rewrite the complete image from offset 0 and truncate to its length
    pub fn persist_full(&mut self) -> Result<()> {
        let image = format::encode_image(self.format, &self.entries)?;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&image)?;
        self.file.set_len(image.len() as u64)?;

        self.records = self.entries.len() as u64;
        self.image_len = image.len() as u64;
        self.pending.clear();
        self.needs_rewrite = false;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.records,
            bytes = self.image_len,
            "Index persisted (full)"
        );
        Ok(())
    }

    /// Append only what changed since the last persist
    pub fn persist_incremental(&mut self) -> Result<()> {
        if self.needs_rewrite || (self.format == IndexFormat::MapImage && self.image_len == 0) {
            return self.persist_full();
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut tail = Vec::new();
        for (key, offset) in &self.pending {
            tail.extend(format::encode_entry(self.format, key, *offset)?);
        }
        let records = self.records + self.pending.len() as u64;

        // Pairs land first, then the header that makes them visible.
        self.file.seek(SeekFrom::Start(self.image_len))?;
        self.file.write_all(&tail)?;
        if self.format == IndexFormat::MapImage {
            debug_assert!(self.image_len >= MAP_HEADER_SIZE);
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&format::map_header(records))?;
        }

        tracing::debug!(
            path = %self.path.display(),
            appended = self.pending.len(),
            records,
            "Index persisted (incremental)"
        );

        self.records = records;
        self.image_len += tail.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Flush the index file to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Pairs physically present in the file image
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }
}
