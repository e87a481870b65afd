// Process-wide context: one binary, one test, since the global can only be set once.

use sicore::storage::MemoryTxnPersistence;
use sicore::timestamp::{MemoryBlockManager, TimestampOracle};
use sicore::transaction::{self, SiContext};
use sicore::{IsolationLevel, SiConfig, SiError, TxnStore};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_global_context_built_once_around_preset_store() {
    let oracle = TimestampOracle::open(Arc::new(MemoryBlockManager::new()), 32).unwrap();
    let store = Arc::new(TxnStore::new(Arc::new(MemoryTxnPersistence::new()), Arc::new(oracle)));
    transaction::set_global_store(Arc::clone(&store)).unwrap();
    assert!(store.cache().is_none());

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                transaction::global().unwrap()
            })
        })
        .collect();
    let contexts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(contexts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    let ctx = &contexts[0];

    // the preset store is used as is; caches and metrics were filled in around it
    assert!(Arc::ptr_eq(ctx.store(), &store));
    assert!(Arc::ptr_eq(store.cache().unwrap(), ctx.completed_cache()));

    let txn = ctx.store().create(None, IsolationLevel::SnapshotIsolation).unwrap();
    store.commit(txn.id).unwrap();
    assert_eq!(ctx.management().total_commits(), 1);

    // too late for another store or another context
    assert!(matches!(transaction::set_global_store(Arc::clone(&store)), Err(SiError::Config(_))));
    let other = SiContext::in_memory(SiConfig::default()).unwrap();
    assert!(matches!(transaction::install_global(other), Err(SiError::Config(_))));
    assert!(Arc::ptr_eq(&transaction::global().unwrap(), ctx));
}
