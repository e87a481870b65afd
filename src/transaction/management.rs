use serde::Serialize;
use std::sync::Arc;

use super::completed_cache::CompletedTxnCache;
use super::ignore_cache::IgnoreTxnCache;
use super::store::TxnStore;
use crate::core::Result;

/// Point-in-time copy of every counter exposed for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagementStats {
    pub total_txn_lookups: u64,
    pub total_txn_elevations: u64,
    pub total_writable_txns_created: u64,
    pub total_rollbacks: u64,
    pub total_commits: u64,
    pub total_evicted_cache_entries: u64,
    pub total_cache_hits: u64,
    pub total_cache_misses: u64,
    pub total_cache_requests: u64,
    pub cache_hit_percentage: f64,
    pub current_cache_size: usize,
    pub max_cache_size: usize,
    pub ignored_txns: usize,
}

/// Read-only observability facade over the store and its caches.
#[derive(Debug, Clone)]
pub struct TxnStoreManagement {
    store: Arc<TxnStore>,
    completed: Arc<CompletedTxnCache>,
    ignored: Arc<IgnoreTxnCache>,
}

impl TxnStoreManagement {
    #[must_use]
    pub const fn new(
        store: Arc<TxnStore>,
        completed: Arc<CompletedTxnCache>,
        ignored: Arc<IgnoreTxnCache>,
    ) -> Self {
        Self {
            store,
            completed,
            ignored,
        }
    }

    #[must_use]
    pub fn total_txn_lookups(&self) -> u64 { self.store.lookup_count() }
    #[must_use]
    pub fn total_txn_elevations(&self) -> u64 { self.store.elevation_count() }
    #[must_use]
    pub fn total_writable_txns_created(&self) -> u64 { self.store.created_count() }
    #[must_use]
    pub fn total_rollbacks(&self) -> u64 { self.store.rollback_count() }
    #[must_use]
    pub fn total_commits(&self) -> u64 { self.store.commit_count() }
    #[must_use]
    pub fn total_evicted_cache_entries(&self) -> u64 { self.completed.total_evicted() }
    #[must_use]
    pub fn total_cache_hits(&self) -> u64 { self.completed.total_hits() }
    #[must_use]
    pub fn total_cache_misses(&self) -> u64 { self.completed.total_misses() }
    #[must_use]
    pub fn total_cache_requests(&self) -> u64 { self.completed.total_requests() }
    #[must_use]
    pub fn cache_hit_percentage(&self) -> f64 { self.completed.hit_percentage() }
    #[must_use]
    pub fn current_cache_size(&self) -> usize { self.completed.current_size() }
    #[must_use]
    pub fn max_cache_size(&self) -> usize { self.completed.max_size() }

    #[must_use]
    pub fn snapshot(&self) -> ManagementStats {
        ManagementStats {
            total_txn_lookups: self.total_txn_lookups(),
            total_txn_elevations: self.total_txn_elevations(),
            total_writable_txns_created: self.total_writable_txns_created(),
            total_rollbacks: self.total_rollbacks(),
            total_commits: self.total_commits(),
            total_evicted_cache_entries: self.total_evicted_cache_entries(),
            total_cache_hits: self.total_cache_hits(),
            total_cache_misses: self.total_cache_misses(),
            total_cache_requests: self.total_cache_requests(),
            cache_hit_percentage: self.cache_hit_percentage(),
            current_cache_size: self.current_cache_size(),
            max_cache_size: self.max_cache_size(),
            ignored_txns: self.ignored.len(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}
