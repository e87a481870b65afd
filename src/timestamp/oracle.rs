use parking_lot::Mutex;
use std::sync::Arc;

use super::block::TimestampBlockManager;
use crate::core::{MAX_TIMESTAMP, Result, SiError, Timestamp};

/// Anything that can hand out fresh timestamps.
pub trait TimestampSource: Send + Sync {
    fn next_timestamp(&self) -> Result<Timestamp>;
}

#[derive(Debug)]
struct OracleState {
    /// Next timestamp to hand out
    next: Timestamp,
    /// Highest timestamp covered by a durable reservation
    reserved: Timestamp,
}

/// Issues strictly increasing, crash-durable timestamps.
///
/// Timestamps are reserved in blocks of `block_size`. The common path is an
/// increment under the lock; only a block rollover touches the block manager,
/// and no timestamp from a new block leaves the oracle before its reservation
/// is durable.
pub struct TimestampOracle {
    block_manager: Arc<dyn TimestampBlockManager>,
    block_size: u64,
    state: Mutex<OracleState>,
}

impl std::fmt::Debug for TimestampOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimestampOracle")
            .field("block_size", &self.block_size)
            .field("next", &state.next)
            .field("reserved", &state.reserved)
            .finish_non_exhaustive()
    }
}

impl TimestampOracle {
    /// Opens the oracle above the last persisted high-water mark and reserves its first block.
    pub fn open(block_manager: Arc<dyn TimestampBlockManager>, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(SiError::Allocation("block size must be > 0".into()));
        }

        let ceiling = block_manager.initial_timestamp_ceiling()?;
        if ceiling >= MAX_TIMESTAMP {
            return Err(SiError::Allocation(format!(
                "persisted ceiling {ceiling} leaves no timestamp space"
            )));
        }
        let oracle = Self {
            block_manager,
            block_size,
            state: Mutex::new(OracleState {
                next: ceiling + 1,
                reserved: ceiling,
            }),
        };

        {
            let mut state = oracle.state.lock();
            oracle.reserve_block(&mut state)?;
        }

        tracing::info!(
            "Timestamp oracle opened above ceiling {} (block size {})",
            ceiling,
            block_size
        );
        Ok(oracle)
    }

    /// Returns the next timestamp.
    ///
    /// Fails with `SiError::Allocation` when a block rollover cannot be made durable;
    /// the oracle stays usable and the caller may retry.
    pub fn next(&self) -> Result<Timestamp> {
        let mut state = self.state.lock();
        if state.next > state.reserved {
            self.reserve_block(&mut state)?;
        }

        let ts = state.next;
        state.next += 1;
        Ok(ts)
    }

    /// Returns the next timestamp only if it needs no block rollover.
    ///
    /// Never touches the block manager, so it is safe on an async worker.
    pub fn next_in_block(&self) -> Option<Timestamp> {
        let mut state = self.state.lock();
        if state.next > state.reserved {
            return None;
        }
        let ts = state.next;
        state.next += 1;
        Some(ts)
    }

    /// Highest timestamp currently covered by a durable reservation.
    #[must_use]
    pub fn reserved_ceiling(&self) -> Timestamp {
        self.state.lock().reserved
    }

    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    fn reserve_block(&self, state: &mut OracleState) -> Result<()> {
        let ceiling = state
            .reserved
            .checked_add(self.block_size)
            .filter(|c| *c <= MAX_TIMESTAMP)
            .ok_or_else(|| SiError::Allocation("timestamp space exhausted".into()))?;

        // Durable first; the in-memory bound only moves after the write succeeded
        self.block_manager.reserve_next_block(ceiling)?;
        tracing::debug!("Reserved timestamp block ({}, {}]", state.reserved, ceiling);
        state.reserved = ceiling;
        Ok(())
    }
}

impl TimestampSource for TimestampOracle {
    fn next_timestamp(&self) -> Result<Timestamp> {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::block::MemoryBlockManager;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Block manager whose writes can be switched off.
    struct FlakyBlockManager {
        inner: MemoryBlockManager,
        fail: AtomicBool,
    }

    impl TimestampBlockManager for FlakyBlockManager {
        fn initial_timestamp_ceiling(&self) -> Result<Timestamp> {
            self.inner.initial_timestamp_ceiling()
        }

        fn reserve_next_block(&self, ceiling: Timestamp) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SiError::Allocation("disk unplugged".into()));
            }
            self.inner.reserve_next_block(ceiling)
        }
    }

    #[test]
    fn test_first_timestamp_is_one() {
        let oracle = TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 10).unwrap();
        assert_eq!(oracle.next().unwrap(), 1);
        assert_eq!(oracle.next().unwrap(), 2);
        assert_eq!(oracle.reserved_ceiling(), 10);
    }

    #[test]
    fn test_rollover_reserves_next_block() {
        let manager = Arc::new(MemoryBlockManager::new());
        let oracle = TimestampOracle::open(manager.clone(), 4).unwrap();

        let issued: Vec<_> = (0..9).map(|_| oracle.next().unwrap()).collect();
        assert_eq!(issued, (1..=9).collect::<Vec<_>>());
        assert_eq!(manager.ceiling(), 12);
        assert!(issued.iter().all(|ts| *ts <= manager.ceiling()));
    }

    #[test]
    fn test_restart_starts_above_ceiling() {
        let manager = Arc::new(MemoryBlockManager::new());
        let before: Vec<_> = {
            let oracle = TimestampOracle::open(manager.clone(), 100).unwrap();
            (0..7).map(|_| oracle.next().unwrap()).collect()
        };

        let oracle = TimestampOracle::open(manager, 100).unwrap();
        let after = oracle.next().unwrap();
        assert_eq!(after, 101);
        assert!(before.iter().all(|ts| *ts < after));
    }

    #[test]
    fn test_failed_rollover_surfaces_and_recovers() {
        let manager = Arc::new(FlakyBlockManager {
            inner: MemoryBlockManager::new(),
            fail: AtomicBool::new(false),
        });
        let oracle = TimestampOracle::open(manager.clone(), 2).unwrap();
        assert_eq!(oracle.next().unwrap(), 1);
        assert_eq!(oracle.next().unwrap(), 2);

        manager.fail.store(true, Ordering::SeqCst);
        assert!(matches!(oracle.next(), Err(SiError::Allocation(_))));
        // the old block is never reused
        assert!(matches!(oracle.next(), Err(SiError::Allocation(_))));

        manager.fail.store(false, Ordering::SeqCst);
        assert_eq!(oracle.next().unwrap(), 3);
    }

    #[test]
    fn test_exhausted_space_is_allocation_error() {
        let manager = Arc::new(MemoryBlockManager::with_ceiling(MAX_TIMESTAMP - 1));
        let err = TimestampOracle::open(manager, 8).unwrap_err();
        assert!(matches!(err, SiError::Allocation(_)));
    }

    #[test]
    fn test_ceiling_beyond_timestamp_space_rejected() {
        for ceiling in [MAX_TIMESTAMP, MAX_TIMESTAMP + 1, u64::MAX] {
            let manager = Arc::new(MemoryBlockManager::with_ceiling(ceiling));
            assert!(matches!(TimestampOracle::open(manager, 8), Err(SiError::Allocation(_))));
        }
    }

    #[test]
    fn test_next_in_block_stops_at_rollover() {
        let manager = Arc::new(MemoryBlockManager::new());
        let oracle = TimestampOracle::open(manager.clone(), 2).unwrap();

        assert_eq!(oracle.next_in_block(), Some(1));
        assert_eq!(oracle.next_in_block(), Some(2));
        assert_eq!(oracle.next_in_block(), None);
        assert_eq!(manager.ceiling(), 2);

        assert_eq!(oracle.next().unwrap(), 3);
        assert_eq!(manager.ceiling(), 4);
        assert_eq!(oracle.next_in_block(), Some(4));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 0).is_err());
    }

    #[test]
    fn test_concurrent_next_is_unique() {
        let oracle = Arc::new(TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 16).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                std::thread::spawn(move || {
                    let mut seen = Vec::with_capacity(500);
                    for _ in 0..500 {
                        seen.push(oracle.next().unwrap());
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let seen = handle.join().unwrap();
            // each thread observes its own timestamps in increasing order
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            for ts in seen {
                assert!(all.insert(ts), "timestamp {ts} issued twice");
            }
        }
        assert_eq!(all.len(), 4000);
    }
}
