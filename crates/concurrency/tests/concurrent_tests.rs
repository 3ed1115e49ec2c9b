//! Concurrent/Multi-threaded Tests for freezer-concurrency
//!
//! These tests verify correct behavior under actual concurrent execution:
//!
//! 1. **Serialization** - The writer lock admits one transaction at a time
//! 2. **Id Monotonicity** - Transaction ids are contiguous under load
//! 3. **Compare-and-retract** - Read-modify-write cycles never lose updates
//! 4. **Snapshot Stability** - Readers never observe partial transactions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use freezer_concurrency::{RetractMode, TransactionManager};
use freezer_core::{EntityId, KeyDef, SnapshotView, TxId, Value, ValueType};
use freezer_durability::{read_wal, DurabilityMode, WalWriter, WAL_FILE_NAME};
use freezer_storage::LogStore;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn setup(manager: &TransactionManager, log: &Arc<LogStore>, keys: Vec<KeyDef>) {
    let mut guard = manager.lock().unwrap();
    let mut txn = guard.begin(log, RetractMode::One);
    for key in keys {
        txn.register_key(key).unwrap();
    }
    guard.commit(&mut txn, log).unwrap();
}

/// One read-modify-write increment of (id, "count")
fn increment(manager: &TransactionManager, log: &Arc<LogStore>, id: EntityId) -> TxId {
    let mut guard = manager.lock().unwrap();
    let mut txn = guard.begin(log, RetractMode::One);
    let current = txn
        .values(id, "count")
        .unwrap()
        .first()
        .and_then(Value::as_integer)
        .unwrap_or(0);
    if current > 0 {
        txn.remove(id, "count", Value::Integer(current)).unwrap();
    }
    txn.add(id, "count", Value::Integer(current + 1)).unwrap();
    guard.commit(&mut txn, log).unwrap().unwrap()
}

// ============================================================================
// Concurrent Commits
// ============================================================================

#[test]
fn test_concurrent_increments_lose_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let manager = Arc::new(TransactionManager::new(None));
    let log = Arc::new(LogStore::new());
    setup(
        &manager,
        &log,
        vec![KeyDef::new("count", ValueType::Integer, false)],
    );
    let id = EntityId::new();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let log = Arc::clone(&log);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|_| increment(&manager, &log, id))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids: Vec<TxId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort();

    // Setup took tx#1; increments took exactly the next THREADS * PER_THREAD ids
    let expected: Vec<TxId> = (2..=(1 + THREADS * PER_THREAD) as u64)
        .map(TxId::new)
        .collect();
    assert_eq!(ids, expected);
    assert_eq!(
        log.snapshot().value(id, "count"),
        Some(Value::Integer((THREADS * PER_THREAD) as i64))
    );
}

#[test]
fn test_concurrent_commits_reach_wal_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(WAL_FILE_NAME);
    let (wal, _) = WalWriter::open(&path, DurabilityMode::default()).unwrap();
    let manager = Arc::new(TransactionManager::new(Some(wal)));
    let log = Arc::new(LogStore::new());
    setup(
        &manager,
        &log,
        vec![KeyDef::new("tag", ValueType::String, true)],
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..25 {
                    let mut guard = manager.lock().unwrap();
                    let mut txn = guard.begin(&log, RetractMode::One);
                    txn.add(EntityId::new(), "tag", Value::from(format!("{}-{}", t, i)))
                        .unwrap();
                    guard.commit(&mut txn, &log).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    manager.flush().unwrap();

    let ids: Vec<u64> = read_wal(&path)
        .unwrap()
        .records
        .iter()
        .map(|r| r.tx_id().as_u64())
        .collect();
    assert_eq!(ids, (1..=101).collect::<Vec<_>>());
}

// ============================================================================
// Snapshot Stability
// ============================================================================

#[test]
fn test_readers_never_see_partial_transactions() {
    let manager = Arc::new(TransactionManager::new(None));
    let log = Arc::new(LogStore::new());
    setup(
        &manager,
        &log,
        vec![
            KeyDef::new("left", ValueType::Integer, false),
            KeyDef::new("right", ValueType::Integer, false),
        ],
    );
    let id = EntityId::new();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let log = Arc::clone(&log);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut checks = 0usize;
            while !done.load(Ordering::Acquire) {
                let snap = log.snapshot();
                // Both keys are always written together
                assert_eq!(snap.value(id, "left"), snap.value(id, "right"));
                checks += 1;
            }
            checks
        })
    };

    for n in 0..200i64 {
        let mut guard = manager.lock().unwrap();
        let mut txn = guard.begin(&log, RetractMode::One);
        txn.add(id, "left", Value::Integer(n)).unwrap();
        txn.add(id, "right", Value::Integer(n)).unwrap();
        guard.commit(&mut txn, &log).unwrap();
    }
    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);
}
