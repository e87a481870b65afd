use serde::{Deserialize, Serialize};

/// Logical timestamp issued by the oracle. Only the low 63 bits are used.
pub type Timestamp = u64;

/// A transaction is identified by its begin timestamp.
pub type TxnId = Timestamp;

/// Largest timestamp the oracle may ever hand out (sign bit reserved).
pub const MAX_TIMESTAMP: Timestamp = i64::MAX as u64;

/// Recorded state of a transaction.
///
/// Transitions only go `Active -> Committed` or `Active -> RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

impl TxnState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[default]
    SnapshotIsolation,
    ReadCommitted,
    ReadUncommitted,
}
