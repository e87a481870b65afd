use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::TxnId;

/// Ids of transactions whose writes must be filtered out of normal visibility.
///
/// Only ids added explicitly are ever reported, so there are no false positives.
/// Nothing is evicted behind the caller's back: dropping an id would make its
/// writes visible again. Callers that purge the ignored data call
/// [`IgnoreTxnCache::remove`] or [`IgnoreTxnCache::retain`].
#[derive(Debug)]
pub struct IgnoreTxnCache {
    ids: DashSet<TxnId>,
    warn_threshold: usize,
    warned: AtomicBool,
}

impl Default for IgnoreTxnCache {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl IgnoreTxnCache {
    /// `warn_threshold`: size above which a warning is logged (once per crossing).
    #[must_use]
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            ids: DashSet::new(),
            warn_threshold,
            warned: AtomicBool::new(false),
        }
    }

    /// Marks `id` as ignored. Returns `false` if it already was.
    pub fn add(&self, id: TxnId) -> bool {
        let inserted = self.ids.insert(id);
        if inserted {
            tracing::debug!("Ignoring writes of transaction {}", id);
            let len = self.ids.len();
            if len > self.warn_threshold && !self.warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "Ignore-transaction cache holds {} ids (threshold {})",
                    len,
                    self.warn_threshold
                );
            }
        }
        inserted
    }

    #[must_use]
    pub fn contains(&self, id: TxnId) -> bool {
        self.ids.contains(&id)
    }

    pub fn remove(&self, id: TxnId) -> bool {
        let removed = self.ids.remove(&id).is_some();
        self.reset_warning();
        removed
    }

    /// Keeps only the ids for which `keep` returns true.
    pub fn retain<F: FnMut(&TxnId) -> bool>(&self, keep: F) {
        self.ids.retain(keep);
        self.reset_warning();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn reset_warning(&self) {
        if self.ids.len() <= self.warn_threshold {
            self.warned.store(false, Ordering::Relaxed);
        }
    }
}
