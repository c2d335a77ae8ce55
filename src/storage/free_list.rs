//! Free-list allocator
//!
//! In-memory set of reusable data-file spans. Decides where every write
//! lands; the file itself is only touched by the caller (DataFile), which
//! writes the free markers this allocator hands back.
//!
//! ## Responsibilities
//! - First-fit claim, with a split when the block is larger than needed
//! - Release with coalescing, so no two free blocks ever touch
//! - Track undersized blocks as fragments
//!
//! Lookups are linear scans over an unordered Vec; typical free lists are
//! short and the scan keeps allocation order deterministic (list order,
//! which is effectively insertion order).

use super::record::{MAX_PAYLOAD_SIZE, PREFIX_SIZE};

/// A free span: a 4-byte marker at `offset` followed by `size` unused bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Position of the free marker
    pub offset: u64,
    /// Free payload bytes after the marker
    pub size: u32,
}

impl FreeBlock {
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// First byte past this block
    pub fn end(&self) -> u64 {
        self.offset + PREFIX_SIZE + self.size as u64
    }

    /// Bytes on disk, marker included
    pub fn span(&self) -> u64 {
        PREFIX_SIZE + self.size as u64
    }
}

/// Outcome of a successful claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// Where the new record's prefix goes
    pub offset: u64,

    /// Leftover block from a split; its marker must be written to the file
    pub residual: Option<FreeBlock>,
}

/// Free-space allocator
#[derive(Debug)]
pub struct FreeList {
    /// Reusable blocks, in insertion order
    blocks: Vec<FreeBlock>,

    /// Blocks that were below `min_block_size` when released.
    /// Tracked for inspection only; never reclaimed from here.
    fragments: Vec<FreeBlock>,

    /// Fragment threshold
    min_block_size: u32,
}

impl FreeList {
    /// Create an empty free list
    pub fn new(min_block_size: u32) -> Self {
        Self {
            blocks: Vec::new(),
            fragments: Vec::new(),
            min_block_size,
        }
    }

    /// Find room for a `size`-byte payload.
    ///
    /// Scans in list order; the first block that either fits exactly or can
    /// be split into the record plus a framed residual wins. Blocks whose
    /// excess is 1..=3 bytes cannot hold a residual marker and are skipped.
    /// Returns `None` when nothing fits and the caller must append.
    pub fn claim(&mut self, size: u32) -> Option<Claim> {
        let needed = size as u64;

        for i in 0..self.blocks.len() {
            let block = self.blocks[i];
            let available = block.size as u64;

            if available == needed {
                self.blocks.remove(i);
                tracing::trace!(offset = block.offset, size, "claim: exact fit");
                return Some(Claim {
                    offset: block.offset,
                    residual: None,
                });
            }

            if available >= needed + PREFIX_SIZE {
                self.blocks.remove(i);
                let residual = FreeBlock::new(
                    block.offset + PREFIX_SIZE + needed,
                    (available - needed - PREFIX_SIZE) as u32,
                );
                self.blocks.push(residual);
                tracing::trace!(
                    offset = block.offset,
                    size,
                    residual = residual.size,
                    "claim: split"
                );
                return Some(Claim {
                    offset: block.offset,
                    residual: Some(residual),
                });
            }
        }

        None
    }

    /// Return a vacated span to the free list.
    ///
    /// Merges with the block ending at `offset` and with the block starting
    /// right after this span, when present. Returns the resulting block; its
    /// marker must be written at `block.offset`.
    pub fn release(&mut self, offset: u64, size: u32) -> FreeBlock {
        let mut block = FreeBlock::new(offset, size);

        if let Some(i) = self.blocks.iter().position(|b| b.end() == block.offset) {
            let prev = self.blocks[i];
            if let Some(merged) = merged_size(prev.size, block.size) {
                self.blocks.remove(i);
                block = FreeBlock::new(prev.offset, merged);
            }
        }

        if let Some(i) = self.blocks.iter().position(|b| b.offset == block.end()) {
            let next = self.blocks[i];
            if let Some(merged) = merged_size(block.size, next.size) {
                self.blocks.remove(i);
                block.size = merged;
            }
        }

        if block.size < self.min_block_size {
            self.fragments.push(block);
        }

        tracing::trace!(offset = block.offset, size = block.size, "release");
        self.blocks.push(block);
        block
    }

    /// Current reusable blocks, in list order
    pub fn blocks(&self) -> &[FreeBlock] {
        &self.blocks
    }

    /// Undersized blocks seen on release
    pub fn fragments(&self) -> &[FreeBlock] {
        &self.fragments
    }

    /// Number of reusable blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes covered by free blocks, markers included
    pub fn free_bytes(&self) -> u64 {
        self.blocks.iter().map(FreeBlock::span).sum()
    }
}

/// Size of two touching blocks merged into one, if a prefix can still describe it
fn merged_size(first: u32, second: u32) -> Option<u32> {
    let total = first as u64 + PREFIX_SIZE + second as u64;
    (total <= MAX_PAYLOAD_SIZE as u64).then_some(total as u32)
}
