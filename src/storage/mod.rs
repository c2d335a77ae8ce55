//! Storage Module
//!
//! The data file and the allocator that decides where records land.
//!
//! ## Responsibilities
//! - Frame values as length-prefixed records
//! - Reuse freed space (first-fit, split, coalesce)
//! - Rebuild the free list from on-disk markers at open time
//!
//! ## File Format
//! ```text
//! ┌──────────────┬───────────────┬──────────────┬───────────────┬─────
//! │ +len (4)     │ value bytes   │ ~size (4)    │ unused bytes  │ ...
//! └──────────────┴───────────────┴──────────────┴───────────────┴─────
//!   live record                    free block
//! ```
//! Every byte belongs to exactly one record; records are contiguous.

mod data_file;
mod free_list;
pub mod record;

pub use data_file::{DataFile, ScanReport, SharedFile};
pub(crate) use data_file::write_all_at;
pub use free_list::{Claim, FreeBlock, FreeList};
pub use record::{RecordHeader, PREFIX_SIZE};
