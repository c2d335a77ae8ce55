//! Read-only store
//!
//! A separate, allocator-free read path: both files are memory-mapped once,
//! the index is decoded up front, and values are served as slices of the
//! data mapping.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::config::{Config, IndexFormat};
use crate::error::{ChestError, Result};
use crate::index::format;
use crate::key::Key;
use crate::storage::record::{self, RecordHeader};
use crate::storage::PREFIX_SIZE;

/// Memory-mapped, immutable view of a store
///
/// Values returned by [`ReadOnlyStore::get`] borrow from the mapping and live
/// as long as the store; use [`ReadOnlyStore::get_owned`] to copy one out.
pub struct ReadOnlyStore {
    path: PathBuf,

    /// Data file mapping; `None` for an empty file
    data: Option<Mmap>,

    /// key -> record offset
    entries: BTreeMap<Key, u64>,
}

impl ReadOnlyStore {
    /// Open an existing store. Both files must exist.
    pub fn open(config: &Config) -> Result<Self> {
        let index_path = config.index_path();
        let data_path = config.data_path();

        let index_file = open_existing(index_path)?;
        let data_file = open_existing(&data_path)?;

        let entries = {
            let index_map = map_file(&index_file)?;
            let bytes = index_map.as_deref().unwrap_or(&[]);
            format::decode_image(config.index_format, bytes)?.entries
        };
        let data = map_file(&data_file)?;

        tracing::info!(
            path = %index_path.display(),
            keys = entries.len(),
            data_len = data.as_ref().map_or(0, |m| m.len()),
            "Store opened read-only"
        );

        Ok(Self {
            path: index_path.to_path_buf(),
            data,
            entries,
        })
    }

    /// Open `path` read-only with the given index format
    pub fn open_path(path: impl AsRef<Path>, index_format: IndexFormat) -> Result<Self> {
        let config = Config::builder()
            .path(path.as_ref())
            .mode(crate::config::OpenMode::ReadOnly)
            .index_format(index_format)
            .build();
        Self::open(&config)
    }

    /// View of the value stored under `key`
    pub fn get(&self, key: impl Into<Key>) -> Result<&[u8]> {
        let key = key.into();
        let offset = match self.entries.get(&key) {
            Some(&offset) => offset,
            None => return Err(ChestError::KeyNotFound(key)),
        };
        self.record_at(&key, offset)
    }

    /// Owned copy of the value stored under `key`
    pub fn get_owned(&self, key: impl Into<Key>) -> Result<Vec<u8>> {
        self.get(key).map(<[u8]>::to_vec)
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.entries.contains_key(&key.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in index order
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_at(&self, key: &Key, offset: u64) -> Result<&[u8]> {
        let bytes = self.data.as_deref().unwrap_or(&[]);
        let corrupt = |what: &str| {
            ChestError::IndexCorrupt(format!("key {} at offset {}: {}", key, offset, what))
        };

        let start = usize::try_from(offset).map_err(|_| corrupt("offset out of range"))?;
        let body = start + PREFIX_SIZE as usize;
        let prefix: [u8; 4] = bytes
            .get(start..body)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| corrupt("prefix past end of data file"))?;

        let len = match record::decode(prefix) {
            RecordHeader::Live(len) => len as usize,
            RecordHeader::Free(_) => return Err(corrupt("free block, not a live record")),
        };
        bytes
            .get(body..body + len)
            .ok_or_else(|| corrupt("payload past end of data file"))
    }
}

fn open_existing(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(ChestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(File::open(path)?)
}

/// Map a whole file; empty files have nothing to map
fn map_file(file: &File) -> Result<Option<Mmap>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: the mapping is read-only and the store never writes through
    // these handles. A concurrent writer truncating the file is outside the
    // single-writer model this store assumes.
    let map = unsafe { Mmap::map(file)? };
    Ok(Some(map))
}
