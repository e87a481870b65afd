// Storage module - durable transaction records (persistence trait, in-memory and log-backed)

mod persistence;
pub mod wal;

pub use persistence::{MemoryTxnPersistence, TxnPersistence};
pub use wal::{LogEntry, LogTxnPersistence};
