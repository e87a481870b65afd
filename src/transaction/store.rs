use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::completed_cache::CompletedTxnCache;
use super::record::Transaction;
use crate::core::{IsolationLevel, Result, SiError, Timestamp, TxnId, TxnState};
use crate::storage::TxnPersistence;
use crate::timestamp::TimestampSource;

#[derive(Debug, Default)]
struct StoreCounters {
    lookups: AtomicU64,
    elevations: AtomicU64,
    created: AtomicU64,
    rollbacks: AtomicU64,
    commits: AtomicU64,
}

/// Source of truth for transaction state.
///
/// Owns the lifecycle `Active -> Committed | RolledBack`, allocating begin and
/// commit timestamps from the oracle and keeping records in the persistence
/// collaborator. Lookups go through the completed-transaction cache once one
/// is attached.
pub struct TxnStore {
    persistence: Arc<dyn TxnPersistence>,
    timestamps: Arc<dyn TimestampSource>,
    cache: OnceCell<Arc<CompletedTxnCache>>,
    counters: StoreCounters,
}

impl std::fmt::Debug for TxnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnStore")
            .field("cache", &self.cache.get())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl TxnStore {
    #[must_use]
    pub fn new(persistence: Arc<dyn TxnPersistence>, timestamps: Arc<dyn TimestampSource>) -> Self {
        Self {
            persistence,
            timestamps,
            cache: OnceCell::new(),
            counters: StoreCounters::default(),
        }
    }

    /// Attaches `cache` unless one is already attached; returns the one in use.
    pub fn attach_cache(&self, cache: Arc<CompletedTxnCache>) -> Arc<CompletedTxnCache> {
        Arc::clone(self.cache.get_or_init(|| cache))
    }

    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CompletedTxnCache>> {
        self.cache.get()
    }

    #[must_use]
    pub fn timestamps(&self) -> &Arc<dyn TimestampSource> {
        &self.timestamps
    }

    /// Begins a transaction, optionally as a child of an active `parent`.
    pub fn create(&self, parent: Option<TxnId>, isolation: IsolationLevel) -> Result<Transaction> {
        if let Some(parent_id) = parent {
            let parent = self.fetch(parent_id)?;
            if !parent.is_active() {
                return Err(SiError::AlreadyFinalized {
                    id: parent_id,
                    state: parent.state,
                });
            }
        }

        let id = self.timestamps.next_timestamp()?;
        let txn = Transaction::new(id, parent, isolation);
        self.persistence.put_record(id, &txn)?;

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("TXN begin: {} parent={:?} isolation={:?}", id, parent, isolation);
        Ok(txn)
    }

    /// Commits `id` and returns its commit timestamp.
    ///
    /// Committing an already committed transaction returns the original timestamp.
    pub fn commit(&self, id: TxnId) -> Result<Timestamp> {
        let current = self.fetch(id)?;
        match current.state {
            TxnState::Committed => return Self::committed_ts(&current),
            TxnState::RolledBack => {
                return Err(SiError::AlreadyFinalized {
                    id,
                    state: TxnState::RolledBack,
                });
            }
            TxnState::Active => {}
        }

        let commit_ts = self.timestamps.next_timestamp()?;
        if self
            .persistence
            .cas_state(id, TxnState::Active, TxnState::Committed, Some(commit_ts))?
        {
            self.counters.commits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("TXN commit: {} at {}", id, commit_ts);
            return Ok(commit_ts);
        }

        // Lost a race; whoever won decides the outcome
        let current = self.fetch(id)?;
        match current.state {
            TxnState::Committed => Self::committed_ts(&current),
            state => Err(SiError::AlreadyFinalized { id, state }),
        }
    }

    /// Rolls `id` back. Rolling back twice is fine; after a commit it is an error.
    pub fn rollback(&self, id: TxnId) -> Result<()> {
        let current = self.fetch(id)?;
        match current.state {
            TxnState::RolledBack => return Ok(()),
            TxnState::Committed => return Err(SiError::AlreadyCommitted(id)),
            TxnState::Active => {}
        }

        if self
            .persistence
            .cas_state(id, TxnState::Active, TxnState::RolledBack, None)?
        {
            self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("TXN rollback: {}", id);
            return Ok(());
        }

        match self.fetch(id)?.state {
            TxnState::Committed => Err(SiError::AlreadyCommitted(id)),
            _ => Ok(()),
        }
    }

    /// Re-parents an active child under `new_parent`.
    ///
    /// The switch is a single persistence-level compare-and-set that also
    /// requires `new_parent` to still be active and not to descend from the
    /// child. A reader walking the chain sees either the old or the new parent,
    /// a concurrent commit or rollback of the child wins over the elevation,
    /// and so does a concurrent commit of the new parent.
    pub fn elevate(&self, child_id: TxnId, new_parent: TxnId) -> Result<()> {
        if child_id == new_parent {
            return Err(SiError::ElevationCycle {
                id: child_id,
                parent: new_parent,
            });
        }

        let parent = self.fetch(new_parent)?;
        if !parent.is_active() {
            return Err(SiError::AlreadyFinalized {
                id: new_parent,
                state: parent.state,
            });
        }

        let child = self.fetch(child_id)?;
        if !child.is_active() {
            return Err(SiError::AlreadyFinalized {
                id: child_id,
                state: child.state,
            });
        }

        if self
            .persistence
            .cas_parent(child_id, child.parent, Some(new_parent))?
        {
            self.counters.elevations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("TXN elevate: {} {:?} -> {}", child_id, child.parent, new_parent);
            return Ok(());
        }

        // Rejected; re-read to report why
        let current = self.fetch(child_id)?;
        if !current.is_active() {
            return Err(SiError::AlreadyFinalized {
                id: child_id,
                state: current.state,
            });
        }
        let parent = self.fetch(new_parent)?;
        if !parent.is_active() {
            return Err(SiError::AlreadyFinalized {
                id: new_parent,
                state: parent.state,
            });
        }
        if current.parent != child.parent {
            return Err(SiError::ElevationConflict {
                id: child_id,
                expected: child.parent,
                actual: current.parent,
            });
        }
        Err(SiError::ElevationCycle {
            id: child_id,
            parent: new_parent,
        })
    }

    /// Current state of `id`, served from the completed cache when possible.
    pub fn lookup(&self, id: TxnId) -> Result<Transaction> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = self.cache.get() {
            if let Some(txn) = cache.get(id) {
                return Ok(txn);
            }
        }

        let txn = self.fetch(id)?;
        if let Some(cache) = self.cache.get() {
            cache.put(&txn);
        }
        Ok(txn)
    }

    /// Reads straight from persistence, bypassing (and not populating) the cache.
    pub fn lookup_uncached(&self, id: TxnId) -> Result<Transaction> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        self.fetch(id)
    }

    fn fetch(&self, id: TxnId) -> Result<Transaction> {
        self.persistence.get_record(id)?.ok_or(SiError::NotFound(id))
    }

    fn committed_ts(txn: &Transaction) -> Result<Timestamp> {
        txn.commit_ts.ok_or_else(|| {
            SiError::StoreUnavailable(format!("committed transaction {} has no commit timestamp", txn.id))
        })
    }

    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.counters.lookups.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elevation_count(&self) -> u64 {
        self.counters.elevations.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.counters.created.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rollback_count(&self) -> u64 {
        self.counters.rollbacks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.counters.commits.load(Ordering::Relaxed)
    }
}
