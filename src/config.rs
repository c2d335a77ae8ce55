//! Configuration for ChestKV
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ChestError, Result};

/// Main configuration for a ChestKV store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Index file path. The data file sits next to it:
    ///   {stem}.{ext}   (index: key -> record offset)
    ///   {stem}.bin     (data:  length-prefixed records)
    pub path: PathBuf,

    /// Read-only or read-write
    pub mode: OpenMode,

    /// Index file encoding
    pub index_format: IndexFormat,

    /// fsync both files on every commit
    pub sync_on_commit: bool,

    // -------------------------------------------------------------------------
    // Write-back Configuration
    // -------------------------------------------------------------------------
    /// Where value writes are performed
    pub write_mode: WriteMode,

    // -------------------------------------------------------------------------
    // Allocation / Read Configuration
    // -------------------------------------------------------------------------
    /// Bytes read in one go when fetching a record (prefix included)
    pub read_buffer_size: usize,

    /// Free blocks smaller than this are also tracked as fragments
    pub min_block_size: u32,
}

/// How the store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Files must exist; mutations fail with PermissionDenied
    ReadOnly,

    /// Files are created if absent
    ReadWrite,
}

impl FromStr for OpenMode {
    type Err = ChestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(OpenMode::ReadOnly),
            "r+" | "read-write" => Ok(OpenMode::ReadWrite),
            other => Err(ChestError::InvalidArgument(format!(
                "open mode must be one of \"read\" or \"read-write\", got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::ReadOnly => write!(f, "read"),
            OpenMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Where value writes happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// A dedicated writer thread performs the data-file writes
    Background,

    /// Writes run on the caller thread (no latency hiding)
    Inline,
}

/// Encoding of the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// Self-describing bincode map image, any key kind
    MapImage,

    /// Fixed 8-byte `(u32 key, u32 offset)` rows, integer keys only
    FixedRows,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./chest.db"),
            mode: OpenMode::ReadWrite,
            index_format: IndexFormat::MapImage,
            sync_on_commit: true,
            write_mode: WriteMode::Background,
            read_buffer_size: 0x200,
            min_block_size: 0x10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Index file path
    pub fn index_path(&self) -> &Path {
        &self.path
    }

    /// Data file path (index path with its extension replaced by `.bin`)
    pub fn data_path(&self) -> PathBuf {
        self.path.with_extension("bin")
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the index file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the open mode
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the index file format
    pub fn index_format(mut self, format: IndexFormat) -> Self {
        self.config.index_format = format;
        self
    }

    /// Enable or disable fsync on commit
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.config.sync_on_commit = sync;
        self
    }

    /// Set the write mode
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    /// Set the read-ahead buffer size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the fragment threshold (in bytes)
    pub fn min_block_size(mut self, size: u32) -> Self {
        self.config.min_block_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::ReadOnly);
        assert_eq!("read".parse::<OpenMode>().unwrap(), OpenMode::ReadOnly);
        assert_eq!("r+".parse::<OpenMode>().unwrap(), OpenMode::ReadWrite);
        assert_eq!("read-write".parse::<OpenMode>().unwrap(), OpenMode::ReadWrite);
        assert!(matches!(
            "w".parse::<OpenMode>(),
            Err(ChestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_data_path_replaces_extension() {
        let config = Config::builder().path("/tmp/store.db").build();
        assert_eq!(config.data_path(), PathBuf::from("/tmp/store.bin"));

        let config = Config::builder().path("/tmp/store").build();
        assert_eq!(config.data_path(), PathBuf::from("/tmp/store.bin"));
    }
}
