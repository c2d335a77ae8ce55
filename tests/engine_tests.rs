//! Integration tests for the Engine
//!
//! These tests verify:
//! - Basic get/set/delete
//! - Placement: in-place shrink, relocation on grow, free block reuse
//! - Coalescing of adjacent free space
//! - Persistence across reopen
//! - Open-time validation

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chestkv::storage::FreeBlock;
use chestkv::{ChestError, Config, Engine, IndexFormat, Key, OpenMode, WriteMode};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.db");
    (temp_dir, path)
}

fn config(path: &Path, mode: WriteMode) -> Config {
    Config::builder()
        .path(path)
        .write_mode(mode)
        .sync_on_commit(false)
        .build()
}

fn open(path: &Path) -> Engine {
    Engine::open(config(path, WriteMode::Background)).unwrap()
}

fn sorted(blocks: &[FreeBlock]) -> Vec<FreeBlock> {
    let mut blocks = blocks.to_vec();
    blocks.sort_by_key(|b| b.offset);
    blocks
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_set_and_get() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, b"hello").unwrap();
    engine.set("name", b"world!").unwrap();
    engine.set(b"raw", b"").unwrap();

    assert_eq!(engine.get(1).unwrap(), b"hello");
    assert_eq!(engine.get("name").unwrap(), b"world!");
    assert_eq!(engine.get(b"raw").unwrap(), Vec::<u8>::new());
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.offset_of(1), Some(0));
    assert_eq!(engine.offset_of("name"), Some(9));
}

#[test]
fn test_binary_values() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    let value: Vec<u8> = (0..=255u8).collect();
    engine.set(7, &value).unwrap();
    engine.set(8, &[0u8; 3]).unwrap();

    assert_eq!(engine.get(7).unwrap(), value);
    assert_eq!(engine.get(8).unwrap(), vec![0u8; 3]);
}

#[test]
fn test_missing_key() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    assert!(matches!(engine.get(1), Err(ChestError::KeyNotFound(Key::Int(1)))));
    assert!(matches!(engine.delete(1), Err(ChestError::KeyNotFound(_))));
    assert!(!engine.contains(1));
}

#[test]
fn test_delete() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, b"hello").unwrap();
    engine.delete(1).unwrap();

    assert!(!engine.contains(1));
    assert!(engine.get(1).unwrap_err().is_key_not_found());
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(0, 5)]);
}

#[test]
fn test_read_your_writes() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    for i in 0..200i64 {
        let value = format!("value-{}", i).repeat((i % 7 + 1) as usize);
        engine.set(i % 13, value.as_bytes()).unwrap();
        assert_eq!(engine.get(i % 13).unwrap(), value.as_bytes());
    }
}

#[test]
fn test_keys_sorted() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(3, b"c").unwrap();
    engine.set(1, b"a").unwrap();
    engine.set(2, b"b").unwrap();

    let keys: Vec<Key> = engine.keys().cloned().collect();
    assert_eq!(keys, vec![Key::Int(1), Key::Int(2), Key::Int(3)]);
}

// =============================================================================
// Placement Tests
// =============================================================================

#[test]
fn test_shrink_in_place_frees_tail() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 100]).unwrap();
    engine.set(1, &[2u8; 10]).unwrap();

    assert_eq!(engine.offset_of(1), Some(0));
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(14, 86)]);

    // An exact fit takes the whole tail
    engine.set(2, &[3u8; 86]).unwrap();
    assert_eq!(engine.offset_of(2), Some(14));
    assert!(engine.free_blocks().is_empty());
    assert_eq!(engine.data_len(), 104);

    assert_eq!(engine.get(1).unwrap(), vec![2u8; 10]);
    assert_eq!(engine.get(2).unwrap(), vec![3u8; 86]);
}

#[test]
fn test_new_key_splits_free_block() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 100]).unwrap();
    engine.delete(1).unwrap();
    engine.set(2, &[2u8; 20]).unwrap();

    assert_eq!(engine.offset_of(2), Some(0));
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(24, 76)]);
    assert_eq!(engine.data_len(), 104);
}

#[test]
fn test_grow_relocates() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 10]).unwrap();
    engine.set(2, &[2u8; 10]).unwrap();
    engine.set(1, &[3u8; 20]).unwrap();

    assert_eq!(engine.offset_of(1), Some(28));
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(0, 10)]);
    assert_eq!(engine.get(1).unwrap(), vec![3u8; 20]);
    assert_eq!(engine.get(2).unwrap(), vec![2u8; 10]);
}

#[test]
fn test_same_size_overwrites_in_place() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, b"aaaa").unwrap();
    engine.set(1, b"bbbb").unwrap();

    assert_eq!(engine.offset_of(1), Some(0));
    assert_eq!(engine.data_len(), 8);
    assert!(engine.free_blocks().is_empty());
    assert_eq!(engine.get(1).unwrap(), b"bbbb");
}

#[test]
fn test_zero_size_tail_merges() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 10]).unwrap();
    engine.set(1, &[1u8; 6]).unwrap();
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(10, 0)]);

    engine.set(2, &[2u8; 10]).unwrap();
    assert_eq!(engine.offset_of(2), Some(14));
    engine.delete(2).unwrap();

    assert_eq!(engine.free_blocks(), &[FreeBlock::new(10, 14)]);
}

#[test]
fn test_small_shrink_relocates() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 10]).unwrap();
    engine.set(2, &[2u8; 5]).unwrap();
    // Two spare bytes cannot hold a marker
    engine.set(1, &[3u8; 8]).unwrap();

    assert_eq!(engine.offset_of(1), Some(23));
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(0, 10)]);
    assert_eq!(engine.get(1).unwrap(), vec![3u8; 8]);
}

#[test]
fn test_adjacent_deletes_coalesce() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 10]).unwrap();
    engine.set(2, &[2u8; 10]).unwrap();
    engine.set(3, &[3u8; 10]).unwrap();

    engine.delete(1).unwrap();
    engine.delete(3).unwrap();
    assert_eq!(engine.free_blocks().len(), 2);

    engine.delete(2).unwrap();
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(0, 38)]);
    assert_eq!(engine.stats().free_bytes, 42);
}

#[test]
fn test_fragments_are_tracked() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, &[1u8; 8]).unwrap();
    engine.set(2, &[2u8; 64]).unwrap();
    engine.delete(1).unwrap();

    assert_eq!(engine.fragments(), &[FreeBlock::new(0, 8)]);
    assert_eq!(engine.stats().fragments, 1);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_data() {
    let (_temp, path) = setup();
    {
        let mut engine = open(&path);
        engine.set(1, b"one").unwrap();
        engine.set("two", b"2").unwrap();
        engine.set(vec![3u8, 3], b"three").unwrap();
        engine.set(4, b"deleted").unwrap();
        engine.delete(4).unwrap();
        engine.close().unwrap();
    }

    let mut engine = open(&path);
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.get(1).unwrap(), b"one");
    assert_eq!(engine.get("two").unwrap(), b"2");
    assert_eq!(engine.get(vec![3u8, 3]).unwrap(), b"three");
    assert!(!engine.contains(4));
    assert_eq!(engine.free_blocks().len(), 1);
}

#[test]
fn test_drop_closes() {
    let (_temp, path) = setup();
    {
        let mut engine = open(&path);
        engine.set(1, b"kept").unwrap();
    }

    let mut engine = open(&path);
    assert_eq!(engine.get(1).unwrap(), b"kept");
}

#[test]
fn test_commit_survives_without_close() {
    let (_temp, path) = setup();
    {
        let mut engine = Engine::open(config(&path, WriteMode::Inline)).unwrap();
        engine.set(1, b"committed").unwrap();
        engine.commit(false).unwrap();
        engine.set(2, b"more").unwrap();
        engine.commit(false).unwrap();
        // Skip close entirely
        std::mem::forget(engine);
    }

    let mut engine = open(&path);
    assert_eq!(engine.get(1).unwrap(), b"committed");
    assert_eq!(engine.get(2).unwrap(), b"more");
}

#[test]
fn test_commit_cleanup_compacts_index() {
    let (_temp, path) = setup();
    let mut engine = open(&path);

    engine.set(1, b"a").unwrap();
    engine.commit(false).unwrap();
    engine.set(1, &[9u8; 40]).unwrap();
    engine.commit(false).unwrap();
    assert_eq!(engine.stats().index_records, 2);

    engine.commit(true).unwrap();
    assert_eq!(engine.stats().index_records, 1);
}

#[test]
fn test_free_space_rebuilt_on_reopen() {
    let (_temp, path) = setup();
    let mut model: HashMap<i64, Vec<u8>> = HashMap::new();
    let before = {
        let mut engine = open(&path);
        let mut seed = 0x2545_f491u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed >> 33
        };

        for _ in 0..500 {
            let key = (next() % 20) as i64;
            if next() % 4 == 0 {
                if model.remove(&key).is_some() {
                    engine.delete(key).unwrap();
                }
            } else {
                let value = vec![(next() % 256) as u8; (next() % 64) as usize];
                engine.set(key, &value).unwrap();
                model.insert(key, value);
            }
        }

        let blocks = sorted(engine.free_blocks());
        engine.close().unwrap();
        blocks
    };

    let mut engine = open(&path);
    let after = sorted(engine.free_blocks());
    assert_eq!(after, before);
    for pair in after.windows(2) {
        assert!(pair[0].end() < pair[1].offset, "{:?} touches {:?}", pair[0], pair[1]);
    }

    assert_eq!(engine.len(), model.len());
    for (key, value) in &model {
        assert_eq!(&engine.get(*key).unwrap(), value);
    }
}

// =============================================================================
// Write Failure Tests
// =============================================================================

/// Store whose data file is `/dev/full`: opens and reads fine, every write
/// fails with ENOSPC
#[cfg(target_os = "linux")]
fn open_on_full_device(path: &Path, mode: WriteMode) -> Option<Engine> {
    if !Path::new("/dev/full").exists() {
        return None;
    }
    std::os::unix::fs::symlink("/dev/full", path.with_extension("bin")).unwrap();
    Some(Engine::open(config(path, mode)).unwrap())
}

#[cfg(target_os = "linux")]
#[test]
fn test_deferred_failure_reserves_nothing() {
    let (_temp, path) = setup();
    let Some(mut engine) = open_on_full_device(&path, WriteMode::Background) else {
        return;
    };

    // Handed off; the failure is only known once the writer gets to it
    engine.set(1, &[1u8; 100]).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(200));
    let data_len = engine.data_len();

    assert!(matches!(engine.set(2, b"x"), Err(ChestError::Io(_))));
    assert!(!engine.contains(2));
    assert_eq!(engine.data_len(), data_len);
    assert!(engine.free_blocks().is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_write_returns_space() {
    let (_temp, path) = setup();
    let Some(mut engine) = open_on_full_device(&path, WriteMode::Inline) else {
        return;
    };

    assert!(matches!(engine.set(1, b"hello"), Err(ChestError::Io(_))));
    assert!(!engine.contains(1));

    // The reserved span is accounted for as free space, not a gap
    assert_eq!(engine.data_len(), 9);
    assert_eq!(engine.free_blocks(), &[FreeBlock::new(0, 5)]);
}

// =============================================================================
// Lifecycle and Validation Tests
// =============================================================================

#[test]
fn test_closed_engine_rejects_operations() {
    let (_temp, path) = setup();
    let mut engine = open(&path);
    engine.set(1, b"x").unwrap();

    engine.close().unwrap();
    assert!(engine.is_closed());
    assert!(matches!(engine.get(1), Err(ChestError::Io(_))));
    assert!(matches!(engine.set(2, b"y"), Err(ChestError::Io(_))));

    // Closing again is fine
    engine.close().unwrap();
}

#[test]
fn test_fixed_rows_reject_string_keys() {
    let (_temp, path) = setup();
    let config = Config::builder()
        .path(&path)
        .index_format(IndexFormat::FixedRows)
        .build();
    let mut engine = Engine::open(config).unwrap();

    assert!(matches!(
        engine.set("name", b"x"),
        Err(ChestError::InvalidArgument(_))
    ));
    assert_eq!(engine.len(), 0);
    assert_eq!(engine.data_len(), 0);

    engine.set(5, b"ok").unwrap();
    assert_eq!(engine.get(5).unwrap(), b"ok");
}

#[test]
fn test_corrupt_index() {
    let (_temp, path) = setup();
    fs::write(&path, [0xffu8; 5]).unwrap();

    let result = Engine::open(config(&path, WriteMode::Background));
    assert!(matches!(result, Err(ChestError::IndexCorrupt(_))));
}

#[test]
fn test_dangling_index_entry() {
    let (_temp, path) = setup();
    {
        let mut engine = open(&path);
        engine.set(1, b"hello").unwrap();
        engine.set(2, b"world!").unwrap();
        engine.close().unwrap();
    }

    // Lose the second record
    let data_path = path.with_extension("bin");
    let file = OpenOptions::new().write(true).open(&data_path).unwrap();
    file.set_len(9).unwrap();
    drop(file);

    let result = Engine::open(config(&path, WriteMode::Background));
    assert!(matches!(result, Err(ChestError::IndexCorrupt(_))));
}

#[test]
fn test_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing").join("store.db");

    let result = Engine::open(config(&path, WriteMode::Background));
    assert!(matches!(result, Err(ChestError::FileNotFound { .. })));
}

#[test]
fn test_engine_requires_read_write() {
    let (_temp, path) = setup();
    let config = Config::builder().path(&path).mode(OpenMode::ReadOnly).build();

    assert!(matches!(
        Engine::open(config),
        Err(ChestError::InvalidArgument(_))
    ));
}
