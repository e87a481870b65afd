use proptest::prelude::*;
use sicore::SiError;
use sicore::timestamp::{FileBlockManager, MemoryBlockManager, TimestampBlockManager, TimestampOracle};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn open_file_oracle(dir: &TempDir, block_size: u64) -> TimestampOracle {
    let manager = Arc::new(FileBlockManager::open(dir.path()).unwrap());
    TimestampOracle::open(manager, block_size).unwrap()
}

#[test]
fn test_restart_never_reissues() {
    let temp_dir = TempDir::new().unwrap();

    let before: Vec<_> = {
        let oracle = open_file_oracle(&temp_dir, 16);
        (0..40).map(|_| oracle.next().unwrap()).collect()
    };
    // dropped without any shutdown step: the persisted ceiling is all that survives

    let oracle = open_file_oracle(&temp_dir, 16);
    let max_before = *before.iter().max().unwrap();
    for _ in 0..40 {
        assert!(oracle.next().unwrap() > max_before);
    }
}

#[test]
fn test_repeated_crashes_keep_increasing() {
    let temp_dir = TempDir::new().unwrap();
    let mut last = 0;

    for _ in 0..5 {
        let oracle = open_file_oracle(&temp_dir, 3);
        for _ in 0..7 {
            let ts = oracle.next().unwrap();
            assert!(ts > last);
            last = ts;
        }
    }
}

#[test]
fn test_concurrent_allocation_distinct_across_blocks() {
    let oracle = Arc::new(TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 7).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let oracle = Arc::clone(&oracle);
            thread::spawn(move || {
                let taken: Vec<_> = (0..300).map(|_| oracle.next().unwrap()).collect();
                // each thread observes its own allocations in increasing order
                assert!(taken.windows(2).all(|w| w[0] < w[1]));
                taken
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for ts in handle.join().unwrap() {
            assert!(seen.insert(ts), "timestamp {ts} issued twice");
        }
    }
    assert_eq!(seen.len(), 1800);
}

struct BrokenDisk;

impl TimestampBlockManager for BrokenDisk {
    fn initial_timestamp_ceiling(&self) -> sicore::Result<u64> {
        Ok(0)
    }

    fn reserve_next_block(&self, _ceiling: u64) -> sicore::Result<()> {
        Err(SiError::Allocation("disk unavailable".into()))
    }
}

#[test]
fn test_open_fails_when_first_block_cannot_be_reserved() {
    let result = TimestampOracle::open(Arc::new(BrokenDisk), 10);
    assert!(matches!(result, Err(SiError::Allocation(_))));
}

proptest! {
    #[test]
    fn prop_timestamps_pairwise_distinct(block_size in 1u64..20, restarts in 1usize..4, per_run in 1usize..30) {
        let manager = Arc::new(MemoryBlockManager::new());
        let mut seen = HashSet::new();
        let mut last = 0;

        for _ in 0..restarts {
            let oracle = TimestampOracle::open(manager.clone(), block_size).unwrap();
            for _ in 0..per_run {
                let ts = oracle.next().unwrap();
                prop_assert!(ts > last);
                prop_assert!(seen.insert(ts));
                prop_assert!(ts <= manager.ceiling());
                last = ts;
            }
        }
    }
}
