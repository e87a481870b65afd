use serde::{Deserialize, Serialize};

use crate::core::{IsolationLevel, Timestamp, TxnId, TxnState};

/// Durable record of one transaction.
///
/// `id` is the begin timestamp. `commit_ts` is set exactly once, on the
/// transition to `Committed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxnId,
    pub parent: Option<TxnId>,
    pub isolation: IsolationLevel,
    pub state: TxnState,
    pub commit_ts: Option<Timestamp>,
}

impl Transaction {
    #[must_use]
    pub const fn new(id: TxnId, parent: Option<TxnId>, isolation: IsolationLevel) -> Self {
        Self {
            id,
            parent,
            isolation,
            state: TxnState::Active,
            commit_ts: None,
        }
    }

    #[must_use]
    pub const fn begin_ts(&self) -> Timestamp {
        self.id
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, TxnState::Active)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
