use thiserror::Error;

use super::types::{TxnId, TxnState};

#[derive(Error, Debug)]
pub enum SiError {
    #[error("Timestamp allocation failed: {0}")]
    Allocation(String),
    #[error("Transaction store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Transaction {0} not found")]
    NotFound(TxnId),
    #[error("Transaction {id} is already finalized ({state:?})")]
    AlreadyFinalized { id: TxnId, state: TxnState },
    #[error("Transaction {0} is already committed")]
    AlreadyCommitted(TxnId),
    #[error("Elevation of transaction {id} lost a race: expected parent {expected:?}, found {actual:?}")]
    ElevationConflict {
        id: TxnId,
        expected: Option<TxnId>,
        actual: Option<TxnId>,
    },
    #[error("Elevating transaction {id} under {parent} would make it its own ancestor")]
    ElevationCycle { id: TxnId, parent: TxnId },
    #[error("Parent chain loops back to transaction {0}")]
    ParentCycle(TxnId),
    #[error("Field {0} is not present in the entry")]
    FieldNotFound(usize),
    #[error("Corrupt entry encoding: {0}")]
    CorruptEncoding(String),
    #[error("Field {0} contains an embedded zero byte")]
    EmbeddedDelimiter(usize),
    #[error("Timestamp delivery failed: {0}")]
    Delivery(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SiError>;

impl From<bincode::Error> for SiError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for SiError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
