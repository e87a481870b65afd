use std::collections::HashSet;
use std::sync::Arc;

use super::ignore_cache::IgnoreTxnCache;
use super::record::Transaction;
use super::store::TxnStore;
use crate::core::{IsolationLevel, Result, SiError, Timestamp, TxnId, TxnState};

/// State of a transaction once its whole parent chain is taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTxn {
    pub state: TxnState,
    /// Commit timestamp of the root, present only when effectively committed
    pub commit_ts: Option<Timestamp>,
}

/// Read-side entry point: combines the ignore cache with cached store lookups.
#[derive(Debug, Clone)]
pub struct Visibility {
    store: Arc<TxnStore>,
    ignored: Arc<IgnoreTxnCache>,
}

impl Visibility {
    #[must_use]
    pub const fn new(store: Arc<TxnStore>, ignored: Arc<IgnoreTxnCache>) -> Self {
        Self { store, ignored }
    }

    pub fn lookup(&self, id: TxnId) -> Result<Transaction> {
        self.store.lookup(id)
    }

    #[must_use]
    pub fn is_ignored(&self, id: TxnId) -> bool {
        self.ignored.contains(id)
    }

    /// `id` followed by its ancestors up to the root.
    ///
    /// Fails with `SiError::ParentCycle` if an id shows up twice.
    pub fn chain(&self, id: TxnId) -> Result<Vec<Transaction>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if !seen.insert(current) {
                return Err(SiError::ParentCycle(current));
            }
            let txn = self.store.lookup(current)?;
            next = txn.parent;
            chain.push(txn);
        }
        Ok(chain)
    }

    /// Resolves `id` through its parent chain.
    ///
    /// Rolled back anywhere in the chain wins over everything; otherwise any
    /// active member keeps it active; otherwise it is committed as of the root.
    pub fn effective(&self, id: TxnId) -> Result<EffectiveTxn> {
        Ok(Self::resolve(&self.chain(id)?))
    }

    fn resolve(chain: &[Transaction]) -> EffectiveTxn {
        if chain.iter().any(|t| t.state == TxnState::RolledBack) {
            return EffectiveTxn {
                state: TxnState::RolledBack,
                commit_ts: None,
            };
        }
        if chain.iter().any(Transaction::is_active) {
            return EffectiveTxn {
                state: TxnState::Active,
                commit_ts: None,
            };
        }
        EffectiveTxn {
            state: TxnState::Committed,
            commit_ts: chain.last().and_then(|root| root.commit_ts),
        }
    }

    /// Whether `reader` may see data written by `writer`.
    pub fn can_see(&self, reader: &Transaction, writer: TxnId) -> Result<bool> {
        if self.ignored.contains(writer) {
            return Ok(false);
        }
        if writer == reader.id {
            return Ok(true);
        }

        let writer_chain = self.chain(writer)?;
        let reader_chain = self.chain(reader.id)?;

        // Shared ancestor: the writes only have to reach that ancestor. An
        // ancestor's writes are always visible (nothing below it). Writes from
        // the reader's own subtree count once committed; from a sibling branch
        // a snapshot reader additionally needs them committed before it began.
        if let Some(shared) = writer_chain
            .iter()
            .position(|w| reader_chain.iter().any(|r| r.id == w.id))
        {
            let below = &writer_chain[..shared];
            let own_subtree = writer_chain[shared].id == reader.id;
            let visible = match reader.isolation {
                IsolationLevel::ReadUncommitted => {
                    below.iter().all(|t| t.state != TxnState::RolledBack)
                }
                IsolationLevel::SnapshotIsolation if !own_subtree => below.iter().all(|t| {
                    t.state == TxnState::Committed
                        && t.commit_ts.is_some_and(|ts| ts < reader.begin_ts())
                }),
                _ => below.iter().all(|t| t.state == TxnState::Committed),
            };
            return Ok(visible);
        }

        let effective = Self::resolve(&writer_chain);
        let visible = match reader.isolation {
            IsolationLevel::SnapshotIsolation => {
                effective.state == TxnState::Committed
                    && effective.commit_ts.is_some_and(|ts| ts < reader.begin_ts())
            }
            IsolationLevel::ReadCommitted => effective.state == TxnState::Committed,
            IsolationLevel::ReadUncommitted => effective.state != TxnState::RolledBack,
        };
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryTxnPersistence, TxnPersistence};
    use crate::timestamp::{MemoryBlockManager, TimestampOracle};

    fn setup() -> (Arc<TxnStore>, Arc<IgnoreTxnCache>, Visibility) {
        let oracle = TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 64).unwrap();
        let store = Arc::new(TxnStore::new(Arc::new(MemoryTxnPersistence::new()), Arc::new(oracle)));
        let ignored = Arc::new(IgnoreTxnCache::default());
        let view = Visibility::new(Arc::clone(&store), Arc::clone(&ignored));
        (store, ignored, view)
    }

    #[test]
    fn test_snapshot_sees_only_earlier_commits() {
        let (store, _, view) = setup();
        let writer = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let early_reader = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        store.commit(writer.id).unwrap();
        let late_reader = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();

        assert!(!view.can_see(&early_reader, writer.id).unwrap());
        assert!(view.can_see(&late_reader, writer.id).unwrap());
    }

    #[test]
    fn test_read_committed_sees_later_commits() {
        let (store, _, view) = setup();
        let writer = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let reader = store.create(None, IsolationLevel::ReadCommitted).unwrap();

        assert!(!view.can_see(&reader, writer.id).unwrap());
        store.commit(writer.id).unwrap();
        assert!(view.can_see(&reader, writer.id).unwrap());
    }

    #[test]
    fn test_read_uncommitted_sees_active_but_not_rolled_back() {
        let (store, _, view) = setup();
        let writer = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let reader = store.create(None, IsolationLevel::ReadUncommitted).unwrap();

        assert!(view.can_see(&reader, writer.id).unwrap());
        store.rollback(writer.id).unwrap();
        assert!(!view.can_see(&reader, writer.id).unwrap());
    }

    #[test]
    fn test_own_writes_and_committed_children_visible() {
        let (store, _, view) = setup();
        let parent = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let child = store.create(Some(parent.id), IsolationLevel::SnapshotIsolation).unwrap();

        assert!(view.can_see(&parent, parent.id).unwrap());
        assert!(!view.can_see(&parent, child.id).unwrap());
        store.commit(child.id).unwrap();
        assert!(view.can_see(&parent, child.id).unwrap());
        // a child sees its parent's writes
        assert!(view.can_see(&child, parent.id).unwrap());
    }

    #[test]
    fn test_effective_commit_ts_is_roots() {
        let (store, _, view) = setup();
        let parent = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let child = store.create(Some(parent.id), IsolationLevel::SnapshotIsolation).unwrap();
        store.commit(child.id).unwrap();

        assert_eq!(view.effective(child.id).unwrap().state, TxnState::Active);

        let parent_ts = store.commit(parent.id).unwrap();
        let effective = view.effective(child.id).unwrap();
        assert_eq!(effective.state, TxnState::Committed);
        assert_eq!(effective.commit_ts, Some(parent_ts));
    }

    #[test]
    fn test_snapshot_sibling_needs_commit_before_reader_began() {
        let (store, _, view) = setup();
        let parent = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let early = store.create(Some(parent.id), IsolationLevel::SnapshotIsolation).unwrap();
        let writer = store.create(Some(parent.id), IsolationLevel::SnapshotIsolation).unwrap();
        let writer_ts = store.commit(writer.id).unwrap();
        let late = store.create(Some(parent.id), IsolationLevel::SnapshotIsolation).unwrap();
        let committed = store.create(Some(parent.id), IsolationLevel::ReadCommitted).unwrap();

        assert!(early.begin_ts() < writer_ts);
        assert!(!view.can_see(&early, writer.id).unwrap());
        assert!(view.can_see(&late, writer.id).unwrap());
        assert!(view.can_see(&committed, writer.id).unwrap());
        // the parent still sees its committed child, begin timestamps aside
        assert!(view.can_see(&parent, writer.id).unwrap());
    }

    #[test]
    fn test_snapshot_cousin_checks_every_branch_commit() {
        let (store, _, view) = setup();
        let root = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        let branch = store.create(Some(root.id), IsolationLevel::SnapshotIsolation).unwrap();
        let leaf = store.create(Some(branch.id), IsolationLevel::SnapshotIsolation).unwrap();
        store.commit(leaf.id).unwrap();
        let reader = store.create(Some(root.id), IsolationLevel::SnapshotIsolation).unwrap();

        // the leaf committed early but its branch had not
        assert!(!view.can_see(&reader, leaf.id).unwrap());
        store.commit(branch.id).unwrap();
        assert!(!view.can_see(&reader, leaf.id).unwrap());

        let later = store.create(Some(root.id), IsolationLevel::SnapshotIsolation).unwrap();
        assert!(view.can_see(&later, leaf.id).unwrap());
    }

    #[test]
    fn test_chain_reports_cycles() {
        let persistence = Arc::new(MemoryTxnPersistence::new());
        let oracle = TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 64).unwrap();
        let store = Arc::new(TxnStore::new(persistence.clone(), Arc::new(oracle)));
        let view = Visibility::new(Arc::clone(&store), Arc::new(IgnoreTxnCache::default()));

        // A loop can only come from a damaged record; write one directly
        persistence
            .put_record(100, &Transaction::new(100, Some(101), IsolationLevel::SnapshotIsolation))
            .unwrap();
        persistence
            .put_record(101, &Transaction::new(101, Some(100), IsolationLevel::SnapshotIsolation))
            .unwrap();

        assert!(matches!(view.chain(100), Err(SiError::ParentCycle(100))));
        assert!(matches!(view.effective(101), Err(SiError::ParentCycle(101))));
        let reader = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        assert!(matches!(view.can_see(&reader, 100), Err(SiError::ParentCycle(_))));
    }

    #[test]
    fn test_ignored_writer_never_visible() {
        let (store, ignored, view) = setup();
        let writer = store.create(None, IsolationLevel::SnapshotIsolation).unwrap();
        store.commit(writer.id).unwrap();
        let reader = store.create(None, IsolationLevel::ReadUncommitted).unwrap();

        assert!(view.can_see(&reader, writer.id).unwrap());
        ignored.add(writer.id);
        assert!(view.is_ignored(writer.id));
        assert!(!view.can_see(&reader, writer.id).unwrap());
    }
}
