// Module declarations
pub mod config;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::SiConfig;
pub use error::{Result, SiError};
pub use types::{IsolationLevel, MAX_TIMESTAMP, Timestamp, TxnId, TxnState};
