//! Sync Module
//!
//! Locking primitives for embedders that share a store between threads.
//! The engine itself assumes a single caller and takes no locks around its
//! index or free list.

mod turn_lock;

pub use turn_lock::{TurnGuard, TurnLock};
