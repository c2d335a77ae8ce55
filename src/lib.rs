//! # ChestKV
//!
//! An embedded, file-backed key-value store with:
//! - Length-prefixed records in a single data file
//! - Free-space reuse (first-fit claim, split, coalescing release)
//! - Background write-back with read-your-writes
//! - A memory-mapped read-only mode
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Chest                               │
//! │              (open mode: read / read-write)                 │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │                               │
//!                ▼                               ▼
//!   ┌─────────────────────────┐       ┌─────────────────────┐
//!   │         Engine          │       │   ReadOnlyStore     │
//!   │   (single caller)       │       │   (mmap, no alloc)  │
//!   └──┬──────────┬────────┬──┘       └─────────────────────┘
//!      │          │        │
//!      ▼          ▼        ▼
//! ┌─────────┐ ┌────────┐ ┌───────────┐      ┌───────────────┐
//! │  Index  │ │FreeList│ │ WriteBack │─────►│ writer thread │
//! │  Store  │ │        │ │ (slot: 1) │      └───────┬───────┘
//! └────┬────┘ └───┬────┘ └───────────┘              │
//!      │          │                                 │
//!      ▼          ▼                                 ▼
//!  index file   ┌──────────────────────────────────────┐
//!               │              DataFile                │
//!               │   [len][value] [~len][free] ...      │
//!               └──────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod key;

pub mod storage;
pub mod index;
pub mod writeback;
pub mod sync;
pub mod engine;
pub mod readonly;
pub mod chest;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use chest::Chest;
pub use config::{Config, IndexFormat, OpenMode, WriteMode};
pub use engine::{Engine, Stats};
pub use error::{ChestError, Result};
pub use key::Key;
pub use readonly::ReadOnlyStore;
pub use sync::TurnLock;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ChestKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
