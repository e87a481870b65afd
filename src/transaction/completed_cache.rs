use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use super::record::Transaction;
use crate::core::TxnId;

/// LRU shard: entries stamped with a use tick, ticks ordered for eviction.
struct LruShard {
    entries: HashMap<TxnId, (Transaction, u64)>,
    /// tick -> id, oldest first
    order: BTreeMap<u64, TxnId>,
    tick: u64,
    capacity: usize,
}

impl LruShard {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(4096)),
            order: BTreeMap::new(),
            tick: 0,
            capacity,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Mark entry as recently used and return a copy
    fn get(&mut self, id: TxnId) -> Option<Transaction> {
        let tick = self.next_tick();
        let (txn, used) = self.entries.get_mut(&id)?;
        self.order.remove(&*used);
        *used = tick;
        self.order.insert(tick, id);
        Some(txn.clone())
    }

    /// Returns the number of evicted entries
    fn put(&mut self, txn: Transaction) -> u64 {
        let tick = self.next_tick();
        let id = txn.id;

        if let Some((_, used)) = self.entries.insert(id, (txn, tick)) {
            self.order.remove(&used);
        }
        self.order.insert(tick, id);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, lru_id)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&lru_id);
            evicted += 1;
        }
        evicted
    }

    fn remove(&mut self, id: TxnId) -> bool {
        match self.entries.remove(&id) {
            Some((_, used)) => {
                self.order.remove(&used);
                true
            }
            None => false,
        }
    }
}

/// Size-bounded, sharded cache of transactions in a terminal state.
///
/// The cache never talks to the store: a miss is reported to the caller, who
/// does the round trip and writes back only terminal records.
pub struct CompletedTxnCache {
    shards: Vec<Mutex<LruShard>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: AtomicU64,
}

impl std::fmt::Debug for CompletedTxnCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedTxnCache")
            .field("shards", &self.shards.len())
            .field("max_size", &self.max_size)
            .field("size", &self.current_size())
            .finish_non_exhaustive()
    }
}

impl CompletedTxnCache {
    /// `max_size` entries spread over `shards` locks (both clamped to at least 1).
    #[must_use]
    pub fn new(max_size: usize, shards: usize) -> Self {
        let max_size = max_size.max(1);
        let shard_count = shards.clamp(1, max_size);
        let base = max_size / shard_count;
        let extra = max_size % shard_count;

        let shards = (0..shard_count)
            .map(|i| Mutex::new(LruShard::new(base + usize::from(i < extra))))
            .collect();

        Self {
            shards,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn shard(&self, id: TxnId) -> &Mutex<LruShard> {
        &self.shards[(id % self.shards.len() as u64) as usize]
    }

    pub fn get(&self, id: TxnId) -> Option<Transaction> {
        let found = self.shard(id).lock().get(id);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Caches `txn` if it is terminal. Returns whether it was stored.
    pub fn put(&self, txn: &Transaction) -> bool {
        if !txn.is_terminal() {
            return false;
        }
        let evicted = self.shard(txn.id).lock().put(txn.clone());
        if evicted > 0 {
            self.evicted.fetch_add(evicted, Ordering::Relaxed);
        }
        true
    }

    pub fn invalidate(&self, id: TxnId) -> bool {
        self.shard(id).lock().remove(id)
    }

    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_hits() + self.total_misses()
    }

    #[must_use]
    pub fn total_evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Hit ratio in percent; 0 before the first request.
    #[must_use]
    pub fn hit_percentage(&self) -> f64 {
        let requests = self.total_requests();
        if requests == 0 {
            0.0
        } else {
            self.total_hits() as f64 * 100.0 / requests as f64
        }
    }

    #[must_use]
    pub fn current_size(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}
