use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::core::{Result, SiError, Timestamp, TxnId, TxnState};
use crate::transaction::Transaction;

/// Durable home of transaction records.
///
/// Both compare-and-set operations must be atomic with respect to every other
/// call on the same id.
pub trait TxnPersistence: Send + Sync {
    /// Writes (or overwrites) the record for `id`.
    fn put_record(&self, id: TxnId, record: &Transaction) -> Result<()>;

    /// Reads the record for `id`; `Ok(None)` if unknown.
    fn get_record(&self, id: TxnId) -> Result<Option<Transaction>>;

    /// Moves `id` from `expected` to `new`, setting `commit_ts`.
    ///
    /// `Ok(false)` when the current state is not `expected`;
    /// `SiError::NotFound` when the record does not exist.
    fn cas_state(
        &self,
        id: TxnId,
        expected: TxnState,
        new: TxnState,
        commit_ts: Option<Timestamp>,
    ) -> Result<bool>;

    /// Replaces the parent pointer, only while the record is still active, its
    /// parent equals `expected_parent`, and `new_parent` is active and not a
    /// descendant of `id`. All of it is checked under the same guard as the write.
    ///
    /// `SiError::NotFound` when either record does not exist.
    fn cas_parent(
        &self,
        id: TxnId,
        expected_parent: Option<TxnId>,
        new_parent: Option<TxnId>,
    ) -> Result<bool>;
}

/// Applies a state compare-and-set to an in-memory record.
pub(crate) fn apply_cas_state(
    record: &mut Transaction,
    expected: TxnState,
    new: TxnState,
    commit_ts: Option<Timestamp>,
) -> bool {
    if record.state != expected {
        return false;
    }
    record.state = new;
    record.commit_ts = commit_ts;
    true
}

/// Applies a parent compare-and-set to an in-memory record.
pub(crate) fn apply_cas_parent(
    record: &mut Transaction,
    expected_parent: Option<TxnId>,
    new_parent: Option<TxnId>,
) -> bool {
    if !record.is_active() || record.parent != expected_parent {
        return false;
    }
    record.parent = new_parent;
    true
}

/// Whether `id` may be placed under `new_parent`: the parent is active and
/// `id` is not already one of its ancestors.
pub(crate) fn accepts_parent(
    records: &HashMap<TxnId, Transaction>,
    id: TxnId,
    new_parent: Option<TxnId>,
) -> Result<bool> {
    let Some(parent_id) = new_parent else {
        return Ok(true);
    };
    let parent = records.get(&parent_id).ok_or(SiError::NotFound(parent_id))?;
    if !parent.is_active() {
        return Ok(false);
    }

    let mut seen = HashSet::new();
    let mut next = Some(parent_id);
    while let Some(current) = next {
        if current == id || !seen.insert(current) {
            return Ok(false);
        }
        next = records.get(&current).and_then(|t| t.parent);
    }
    Ok(true)
}

/// Volatile persistence, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryTxnPersistence {
    records: RwLock<HashMap<TxnId, Transaction>>,
}

impl MemoryTxnPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TxnPersistence for MemoryTxnPersistence {
    fn put_record(&self, id: TxnId, record: &Transaction) -> Result<()> {
        self.records.write().insert(id, record.clone());
        Ok(())
    }

    fn get_record(&self, id: TxnId) -> Result<Option<Transaction>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn cas_state(
        &self,
        id: TxnId,
        expected: TxnState,
        new: TxnState,
        commit_ts: Option<Timestamp>,
    ) -> Result<bool> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or(SiError::NotFound(id))?;
        Ok(apply_cas_state(record, expected, new, commit_ts))
    }

    fn cas_parent(
        &self,
        id: TxnId,
        expected_parent: Option<TxnId>,
        new_parent: Option<TxnId>,
    ) -> Result<bool> {
        let mut records = self.records.write();
        if !records.contains_key(&id) {
            return Err(SiError::NotFound(id));
        }
        if !accepts_parent(&records, id, new_parent)? {
            return Ok(false);
        }
        let record = records.get_mut(&id).ok_or(SiError::NotFound(id))?;
        Ok(apply_cas_parent(record, expected_parent, new_parent))
    }
}
