use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;

use super::completed_cache::CompletedTxnCache;
use super::ignore_cache::IgnoreTxnCache;
use super::management::TxnStoreManagement;
use super::store::TxnStore;
use super::visibility::Visibility;
use crate::core::{Result, SiConfig, SiError};
use crate::storage::{LogTxnPersistence, MemoryTxnPersistence, TxnPersistence};
use crate::timestamp::{
    FileBlockManager, MemoryBlockManager, TimestampBlockManager, TimestampOracle, TimestampSource,
};

/// Everything the read/write path needs, built together and shared by handle.
#[derive(Debug, Clone)]
pub struct SiContext {
    store: Arc<TxnStore>,
    completed: Arc<CompletedTxnCache>,
    ignored: Arc<IgnoreTxnCache>,
    management: TxnStoreManagement,
    visibility: Visibility,
}

impl SiContext {
    #[must_use]
    pub fn builder(config: SiConfig) -> SiContextBuilder {
        SiContextBuilder::new(config)
    }

    /// Volatile context: in-memory high-water mark and transaction records.
    pub fn in_memory(config: SiConfig) -> Result<Self> {
        Self::builder(config)
            .with_block_manager(Arc::new(MemoryBlockManager::new()))
            .with_persistence(Arc::new(MemoryTxnPersistence::new()))
            .build()
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<TxnStore> {
        &self.store
    }

    #[must_use]
    pub const fn completed_cache(&self) -> &Arc<CompletedTxnCache> {
        &self.completed
    }

    #[must_use]
    pub const fn ignore_cache(&self) -> &Arc<IgnoreTxnCache> {
        &self.ignored
    }

    #[must_use]
    pub const fn management(&self) -> &TxnStoreManagement {
        &self.management
    }

    #[must_use]
    pub const fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    #[must_use]
    pub fn timestamps(&self) -> &Arc<dyn TimestampSource> {
        self.store.timestamps()
    }
}

/// Assembles a [`SiContext`]. Missing collaborators default to the durable
/// file-backed ones under `config.data_dir`.
pub struct SiContextBuilder {
    config: SiConfig,
    store: Option<Arc<TxnStore>>,
    block_manager: Option<Arc<dyn TimestampBlockManager>>,
    persistence: Option<Arc<dyn TxnPersistence>>,
}

impl SiContextBuilder {
    #[must_use]
    pub const fn new(config: SiConfig) -> Self {
        Self {
            config,
            store: None,
            block_manager: None,
            persistence: None,
        }
    }

    /// Uses an existing store; only the caches and facades are built around it.
    #[must_use]
    pub fn with_store(mut self, store: Arc<TxnStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_block_manager(mut self, block_manager: Arc<dyn TimestampBlockManager>) -> Self {
        self.block_manager = Some(block_manager);
        self
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn TxnPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> Result<SiContext> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => {
                let block_manager: Arc<dyn TimestampBlockManager> = match self.block_manager {
                    Some(manager) => manager,
                    None => Arc::new(FileBlockManager::open(&self.config.data_dir)?),
                };
                let persistence: Arc<dyn TxnPersistence> = match self.persistence {
                    Some(persistence) => persistence,
                    None => Arc::new(LogTxnPersistence::open(&self.config.data_dir)?),
                };
                let oracle = TimestampOracle::open(block_manager, self.config.timestamp_block_size)?;
                Arc::new(TxnStore::new(persistence, Arc::new(oracle)))
            }
        };

        // A pre-set store may already carry a cache; keep it
        let completed = store.attach_cache(Arc::new(CompletedTxnCache::new(
            self.config.completed_cache_size,
            self.config.completed_cache_shards,
        )));
        let ignored = Arc::new(IgnoreTxnCache::new(self.config.ignore_cache_warn_threshold));
        let management =
            TxnStoreManagement::new(Arc::clone(&store), Arc::clone(&completed), Arc::clone(&ignored));
        let visibility = Visibility::new(Arc::clone(&store), Arc::clone(&ignored));

        Ok(SiContext {
            store,
            completed,
            ignored,
            management,
            visibility,
        })
    }
}

static GLOBAL: OnceCell<Arc<SiContext>> = OnceCell::new();
static PRESET_STORE: Mutex<Option<Arc<TxnStore>>> = parking_lot::const_mutex(None);

/// Process-wide context, built on first use from [`SiConfig::load`].
///
/// Concurrent first callers all get the same fully built instance. A store
/// handed to [`set_global_store`] beforehand is used instead of opening one.
pub fn global() -> Result<Arc<SiContext>> {
    GLOBAL
        .get_or_try_init(|| {
            // Held for the whole build so a concurrent preset cannot slip in unseen
            let mut preset = PRESET_STORE.lock();
            let mut builder = SiContextBuilder::new(SiConfig::load()?);
            if let Some(store) = preset.take() {
                tracing::debug!("Building global context around a preset transaction store");
                builder = builder.with_store(store);
            }
            builder.build().map(Arc::new)
        })
        .cloned()
}

/// Injects the store the global context will be built around.
///
/// Fails once the global context exists.
pub fn set_global_store(store: Arc<TxnStore>) -> Result<()> {
    let mut preset = PRESET_STORE.lock();
    if GLOBAL.get().is_some() {
        return Err(SiError::Config("global context is already initialized".into()));
    }
    *preset = Some(store);
    Ok(())
}

/// Installs a fully built context as the global one. Fails if one exists.
pub fn install_global(context: SiContext) -> Result<Arc<SiContext>> {
    let context = Arc::new(context);
    GLOBAL
        .set(Arc::clone(&context))
        .map_err(|_| SiError::Config("global context is already initialized".into()))?;
    Ok(context)
}
