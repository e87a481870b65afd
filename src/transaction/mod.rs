// Transaction module - lifecycle store, completed/ignore caches, visibility, process context

mod completed_cache;
pub mod context;
mod ignore_cache;
mod management;
mod record;
mod store;
mod visibility;

pub use completed_cache::CompletedTxnCache;
pub use context::{SiContext, SiContextBuilder, global, install_global, set_global_store};
pub use ignore_cache::IgnoreTxnCache;
pub use management::{ManagementStats, TxnStoreManagement};
pub use record::Transaction;
pub use store::TxnStore;
pub use visibility::{EffectiveTxn, Visibility};
