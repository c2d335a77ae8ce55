//! Chest handle
//!
//! Mapping-like entry point that picks the read-write engine or the
//! read-only mapping from an open mode.

use std::borrow::Cow;
use std::path::Path;

use crate::config::{Config, OpenMode};
use crate::engine::Engine;
use crate::error::{ChestError, Result};
use crate::key::Key;
use crate::readonly::ReadOnlyStore;

/// A store opened in either mode
///
/// ```no_run
/// use chestkv::Chest;
///
/// let mut db = Chest::open("data/users.db", "read-write")?;
/// db.set(1, b"hello")?;
/// assert_eq!(&*db.get(1)?, b"hello");
/// db.close()?;
/// # Ok::<(), chestkv::ChestError>(())
/// ```
pub enum Chest {
    ReadWrite(Engine),
    ReadOnly(ReadOnlyStore),
}

impl Chest {
    /// Open `path` with a mode string: `"read"`/`"r"` or `"read-write"`/`"r+"`
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let mode: OpenMode = mode.parse()?;
        let config = Config::builder().path(path.as_ref()).mode(mode).build();
        Self::open_with(config)
    }

    /// Open with a full config
    pub fn open_with(config: Config) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(ChestError::InvalidArgument(
                "store path must not be empty".to_string(),
            ));
        }
        match config.mode {
            OpenMode::ReadWrite => Ok(Chest::ReadWrite(Engine::open(config)?)),
            OpenMode::ReadOnly => Ok(Chest::ReadOnly(ReadOnlyStore::open(&config)?)),
        }
    }

    pub fn mode(&self) -> OpenMode {
        match self {
            Chest::ReadWrite(_) => OpenMode::ReadWrite,
            Chest::ReadOnly(_) => OpenMode::ReadOnly,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value under `key`: owned in read-write mode, a view of the mapping in
    /// read-only mode
    pub fn get(&mut self, key: impl Into<Key>) -> Result<Cow<'_, [u8]>> {
        match self {
            Chest::ReadWrite(engine) => engine.get(key).map(Cow::Owned),
            Chest::ReadOnly(store) => store.get(key).map(Cow::Borrowed),
        }
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        match self {
            Chest::ReadWrite(engine) => engine.contains(key),
            Chest::ReadOnly(store) => store.contains(key),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Chest::ReadWrite(engine) => engine.len(),
            Chest::ReadOnly(store) => store.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in index order
    pub fn keys(&self) -> Box<dyn Iterator<Item = &Key> + '_> {
        match self {
            Chest::ReadWrite(engine) => Box::new(engine.keys()),
            Chest::ReadOnly(store) => Box::new(store.keys()),
        }
    }

    // =========================================================================
    // Mutations (read-write only)
    // =========================================================================

    pub fn set(&mut self, key: impl Into<Key>, value: &[u8]) -> Result<()> {
        self.engine_mut("set")?.set(key, value)
    }

    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.engine_mut("delete")?.delete(key)
    }

    pub fn commit(&mut self, cleanup: bool) -> Result<()> {
        self.engine_mut("commit")?.commit(cleanup)
    }

    /// Close the store; a no-op for read-only handles and repeated calls
    pub fn close(&mut self) -> Result<()> {
        match self {
            Chest::ReadWrite(engine) => engine.close(),
            Chest::ReadOnly(_) => Ok(()),
        }
    }

    fn engine_mut(&mut self, op: &str) -> Result<&mut Engine> {
        match self {
            Chest::ReadWrite(engine) => Ok(engine),
            Chest::ReadOnly(store) => Err(ChestError::PermissionDenied(format!(
                "{} on read-only store {}",
                op,
                store.path().display()
            ))),
        }
    }
}
