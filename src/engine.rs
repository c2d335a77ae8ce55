//! Engine Module
//!
//! The read-write store: composes the data file, free list, index and
//! write-back into get/set/delete/commit.
//!
//! ## Responsibilities
//! - Decide where each value lands (claim, append, in place)
//! - Return vacated space to the free list
//! - Keep the index pointing at live records only
//! - Rebuild the free list from the data file on open

use std::collections::HashSet;
use std::io;
use std::path::Path;

use bytes::Bytes;

use crate::config::{Config, OpenMode};
use crate::error::{ChestError, Result};
use crate::index::IndexStore;
use crate::key::Key;
use crate::storage::record::{self, RecordHeader};
use crate::storage::{DataFile, FreeBlock, FreeList, PREFIX_SIZE};
use crate::writeback::WriteBack;

/// The read-write storage engine
///
/// ## Concurrency Model: single caller, one writer thread
///
/// - The index and free list are mutated only through `&mut self`, on the
///   caller's thread. Wrap the engine in a lock to share it between threads.
/// - Value writes go to the writer thread; the index is updated at hand-off,
///   before the bytes land.
/// - Any access to the file from the caller side (reads, reading an old
///   prefix, writing free markers over an old record) first waits for all
///   handed-off writes. New keys that claim or append never wait.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Value store
    data: DataFile,

    /// Reusable spans of the data file
    free_list: FreeList,

    /// key -> record offset
    index: IndexStore,

    /// Value writer
    writer: WriteBack,

    /// Set once close has run
    closed: bool,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub keys: usize,
    pub data_len: u64,
    pub free_blocks: usize,
    pub free_bytes: u64,
    pub fragments: usize,
    pub pending_writes: usize,
    pub index_records: u64,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Open/create the data file and scan it (torn tail is cut off)
    /// 2. Open/create the index file and decode it
    /// 3. Check every index entry points at a live record
    /// 4. Rebuild the free list from the scanned free markers
    /// 5. Start the writer
    pub fn open(config: Config) -> Result<Self> {
        if config.mode != OpenMode::ReadWrite {
            return Err(ChestError::InvalidArgument(
                "Engine is the read-write handle; open read-only stores with ReadOnlyStore"
                    .to_string(),
            ));
        }
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ChestError::FileNotFound {
                    path: parent.to_path_buf(),
                });
            }
        }

        // Step 1: Data file
        let mut data = DataFile::open(&config.data_path(), config.read_buffer_size)?;
        let report = data.scan()?;

        // Step 2: Index file
        let index = IndexStore::open(config.index_path(), config.index_format)?;

        // Step 3: Every entry must land on a live record
        let live: HashSet<u64> = report.live.iter().copied().collect();
        if let Some((key, offset)) = index.iter().find(|(_, offset)| !live.contains(offset)) {
            return Err(ChestError::IndexCorrupt(format!(
                "key {} points at offset {}, which is not a live record",
                key, offset
            )));
        }

        // Step 4: Free list; touching markers left by older writers are merged
        let mut free_list = FreeList::new(config.min_block_size);
        for block in &report.free {
            let merged = free_list.release(block.offset, block.size);
            if merged != *block {
                data.mark_free(merged)?;
            }
        }
        tracing::debug!(
            free_blocks = free_list.len(),
            free_bytes = free_list.free_bytes(),
            live_records = report.live.len(),
            "Free list rebuilt"
        );

        // Step 5: Writer
        let writer = WriteBack::start(config.write_mode, data.shared())?;

        tracing::info!(
            path = %config.path.display(),
            keys = index.len(),
            data_len = data.len(),
            write_mode = ?config.write_mode,
            "Store opened"
        );

        Ok(Self {
            config,
            data,
            free_list,
            index,
            writer,
            closed: false,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config (read-write, background writes) for `path`
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder().path(path.as_ref()).build();
        Self::open(config)
    }

    // =========================================================================
    // Mapping Operations
    // =========================================================================

    /// Get the value stored under `key`
    ///
    /// Waits for outstanding writes before reading, so a value set just
    /// before is always what comes back.
    pub fn get(&mut self, key: impl Into<Key>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let key = key.into();
        let offset = match self.index.get(&key) {
            Some(offset) => offset,
            None => return Err(ChestError::KeyNotFound(key)),
        };

        self.writer.wait()?;
        self.data.read_record_at(offset)
    }

    /// Store `value` under `key`
    ///
    /// - New key: claim a free block, else append
    /// - Larger value: claim or append, then free the old record
    /// - Smaller value: rewrite in place and free the remainder
    /// - Same size: rewrite in place
    pub fn set(&mut self, key: impl Into<Key>, value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let key = key.into();
        let new_len = record::checked_len(value.len())?;
        self.index.check_entry(&key, self.data.len())?;
        // Earlier writes that failed are reported before any space moves.
        self.writer.check()?;

        match self.index.get(&key) {
            Some(old_offset) => self.update(key, old_offset, value, new_len),
            None => {
                let offset = self.allocate(new_len)?;
                self.place_value(offset, value, new_len)?;
                self.index.insert(key, offset);
                Ok(())
            }
        }
    }

    /// Remove `key`; its record becomes free space
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.ensure_open()?;
        let key = key.into();
        let offset = match self.index.get(&key) {
            Some(offset) => offset,
            None => return Err(ChestError::KeyNotFound(key)),
        };

        self.writer.wait()?;
        let len = self.live_len_at(&key, offset)?;
        self.index.remove(&key);
        self.release(offset, len)
    }

    /// True if `key` is present
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.index.contains(&key.into())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keys in index order
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.index.keys()
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Persist the index.
    ///
    /// Waits for outstanding value writes first, so the persisted index never
    /// references bytes that have not been written. `cleanup` rewrites the
    /// whole image; otherwise only new entries are appended.
    pub fn commit(&mut self, cleanup: bool) -> Result<()> {
        self.ensure_open()?;
        self.writer.wait()?;
        self.persist(cleanup)
    }

    /// Stop the writer, rewrite the index and flush both files.
    ///
    /// Safe to call more than once; later calls do nothing. Dropping an open
    /// engine closes it too, logging instead of returning errors.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.writer.shutdown()?;
        self.persist(true)?;
        self.data.sync()?;
        self.index.sync()?;

        tracing::info!(
            path = %self.config.path.display(),
            keys = self.index.len(),
            bytes_written = self.writer.bytes_written(),
            "Store closed"
        );
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn update(&mut self, key: Key, old_offset: u64, value: &[u8], new_len: u32) -> Result<()> {
        // The old record may still be queued; its prefix has to be on disk.
        self.writer.wait()?;
        let old_len = self.live_len_at(&key, old_offset)?;

        if new_len == old_len {
            return self.write_value(old_offset, value);
        }

        let spare = old_len.saturating_sub(new_len) as u64;
        if new_len < old_len && spare >= PREFIX_SIZE {
            // Shrink in place; the tail becomes its own free block
            self.write_value(old_offset, value)?;
            let tail = old_offset + PREFIX_SIZE + new_len as u64;
            return self.release(tail, (spare - PREFIX_SIZE) as u32);
        }

        // Grow, or a shrink whose 1..=3 spare bytes cannot be framed
        let offset = self.allocate(new_len)?;
        self.place_value(offset, value, new_len)?;
        self.index.insert(key, offset);
        self.release(old_offset, old_len)
    }

    /// Pick the offset for a new record of `len` payload bytes
    fn allocate(&mut self, len: u32) -> Result<u64> {
        match self.free_list.claim(len) {
            Some(claim) => {
                if let Some(residual) = claim.residual {
                    self.data.mark_free(residual)?;
                }
                Ok(claim.offset)
            }
            None => Ok(self.data.reserve_append(len)),
        }
    }

    /// Free a span and write its (possibly merged) marker
    fn release(&mut self, offset: u64, size: u32) -> Result<()> {
        let block = self.free_list.release(offset, size);
        self.data.mark_free(block)
    }

    /// Write a value into freshly allocated space. If the write cannot be
    /// handed off, the space goes back to the free list.
    fn place_value(&mut self, offset: u64, value: &[u8], len: u32) -> Result<()> {
        let result = self.write_value(offset, value);
        if result.is_err() {
            if let Err(e) = self.release(offset, len) {
                tracing::warn!(offset, error = %e, "Failed to free unused allocation");
            }
        }
        result
    }

    fn write_value(&mut self, offset: u64, value: &[u8]) -> Result<()> {
        let framed = Bytes::from(record::frame(value)?);
        self.writer.submit(offset, framed)
    }

    fn live_len_at(&mut self, key: &Key, offset: u64) -> Result<u32> {
        match self.data.read_header_at(offset)? {
            RecordHeader::Live(len) => Ok(len),
            RecordHeader::Free(_) => Err(ChestError::IndexCorrupt(format!(
                "key {} points at offset {}, which is a free block",
                key, offset
            ))),
        }
    }

    fn persist(&mut self, cleanup: bool) -> Result<()> {
        if self.config.sync_on_commit {
            self.data.sync()?;
        }
        if cleanup {
            self.index.persist_full()?;
        } else {
            self.index.persist_incremental()?;
        }
        if self.config.sync_on_commit {
            self.index.sync()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ChestError::Io(io::Error::new(
                io::ErrorKind::Other,
                "store is closed",
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Current free blocks, in allocation order
    pub fn free_blocks(&self) -> &[FreeBlock] {
        self.free_list.blocks()
    }

    /// Undersized blocks recorded on release
    pub fn fragments(&self) -> &[FreeBlock] {
        self.free_list.fragments()
    }

    /// Offset of the record for `key`
    pub fn offset_of(&self, key: impl Into<Key>) -> Option<u64> {
        self.index.get(&key.into())
    }

    /// Logical data file length
    pub fn data_len(&self) -> u64 {
        self.data.len()
    }

    /// Writes handed off but not yet observed
    pub fn pending_writes(&self) -> usize {
        self.writer.pending()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            keys: self.index.len(),
            data_len: self.data.len(),
            free_blocks: self.free_list.len(),
            free_bytes: self.free_list.free_bytes(),
            fragments: self.free_list.fragments().len(),
            pending_writes: self.writer.pending(),
            index_records: self.index.records(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "Failed to close store cleanly");
        }
    }
}
