//! Index Module
//!
//! Key -> record offset mapping and its file formats.
//!
//! ## Responsibilities
//! - Hold the authoritative in-memory mapping between commits
//! - Decode the index file at open (empty file = empty index)
//! - Persist full images or append incremental entries

pub mod format;
mod store;

pub use format::DecodedImage;
pub use store::IndexStore;
