// Timestamp module - durable block reservation and the oracle

mod block;
mod oracle;

pub use block::{FileBlockManager, MemoryBlockManager, TimestampBlockManager};
pub use oracle::{TimestampOracle, TimestampSource};
