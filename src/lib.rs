// sicore - snapshot-isolation transactional core
// Timestamp oracle, transaction store with caches, entry codec

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]

// Errors, configuration, shared scalar types
pub mod core;

// Timestamp oracle and durable block reservation
pub mod timestamp;

// Timestamp authority over TCP (server, client, wire frames)
pub mod network;

// Durable transaction records (in-memory, append-only log)
pub mod storage;

// Transaction lifecycle, caches, visibility, process context
pub mod transaction;

// Entry codec (bit-index header, typed fields)
pub mod encoding;

// Byte helpers
pub mod util;

// Re-export commonly used types for convenience
pub use core::{IsolationLevel, Result, SiConfig, SiError, Timestamp, TxnId, TxnState};
pub use encoding::{EntryDecoder, EntryEncoder, FieldKind};
pub use network::{TimestampClient, TimestampServer};
pub use timestamp::{TimestampOracle, TimestampSource};
pub use transaction::{SiContext, Transaction, TxnStore, Visibility};
