//! End-to-end scenarios through the `freezer` facade

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use freezer::{ErrorKind, FreezerError, Store, TxId, Value, ValueType};
use tempfile::TempDir;

#[test]
fn test_people_directory() {
    let dir = TempDir::new().unwrap();
    let (alice, bob) = {
        let store = Store::open(dir.path()).unwrap();
        let tx = store.transactor();
        tx.perform_changes(|s| {
            s.add_key("person/name", ValueType::String, false)?;
            s.add_key("person/email", ValueType::String, true)?;
            s.add_key("person/friend", ValueType::Ref, true)?;
            Ok(())
        })
        .unwrap();

        let alice = tx.generate_new_id();
        let bob = tx.generate_new_id();
        tx.add_values(alice, |s| {
            s.add_value("Alice", "person/name")?;
            s.add_value("alice@example.com", "person/email")?;
            s.add_value(bob, "person/friend")
        })
        .unwrap();
        tx.add_values(bob, |s| s.add_value("Bob", "person/name")).unwrap();
        (alice, bob)
    };

    let store = Store::open(dir.path()).unwrap();
    let db = store.current_database();
    assert_eq!(db.tx_id(), TxId::new(3));
    assert_eq!(db.value(alice, "person/name"), Some(Value::from("Alice")));
    assert_eq!(db.values(alice, "person/friend"), vec![Value::Ref(bob)]);
    assert_eq!(db.entity_ids().len(), 2);
}

#[test]
fn test_counter_with_compare_and_retract() {
    let store = Store::cache();
    let tx = store.transactor();
    tx.add_key("count", ValueType::Integer, false).unwrap();
    let id = tx.generate_new_id();
    tx.add_value(0, "count", id).unwrap();

    const THREADS: i64 = 4;
    const INCREMENTS: i64 = 25;

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let tx = store.transactor();
                let mut done = 0;
                while done < INCREMENTS {
                    let current = store.current_database().value(id, "count").unwrap();
                    let next = current.as_integer().unwrap() + 1;
                    let attempt = tx.perform_changes(|s| {
                        s.remove_value(current.clone(), "count", id)?;
                        s.add_value(next, "count", id)
                    });
                    match attempt {
                        Ok(()) => done += 1,
                        Err(e) if e.kind() == ErrorKind::InvalidValue => continue,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            });
        }
    });

    assert_eq!(
        store.current_database().value(id, "count"),
        Some(Value::Integer(THREADS * INCREMENTS))
    );
}

#[test]
fn test_readers_never_see_half_a_transaction() {
    let store = Store::cache();
    let tx = store.transactor();
    tx.add_key("left", ValueType::Integer, false).unwrap();
    tx.add_key("right", ValueType::Integer, false).unwrap();
    let id = tx.generate_new_id();
    tx.perform_changes(|s| {
        s.add_value(0, "left", id)?;
        s.add_value(0, "right", id)
    })
    .unwrap();

    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 1..=200 {
                store
                    .transactor()
                    .perform_changes(|s| {
                        s.add_value(i, "left", id)?;
                        s.add_value(i, "right", id)
                    })
                    .unwrap();
            }
            stop.store(true, Ordering::Release);
        });
        scope.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                let db = store.current_database();
                assert_eq!(db.value(id, "left"), db.value(id, "right"));
            }
        });
    });
}

#[test]
fn test_routine_error_type_is_preserved() {
    let store = Store::cache();
    let tx = store.transactor();
    tx.add_key("n", ValueType::Integer, false).unwrap();
    let id = tx.generate_new_id();

    let err = tx
        .perform_changes(|s| {
            s.add_value(1, "n", id)?;
            Err::<(), _>(FreezerError::aborted("user cancelled"))
        })
        .unwrap_err();
    assert_eq!(err.to_string(), "transaction aborted: user cancelled");
    assert!(!store.current_database().contains(id));
}

#[test]
fn test_trim_then_keep_working() {
    let mut store = Store::cache();
    let id = {
        let tx = store.transactor();
        tx.add_key("status", ValueType::String, false).unwrap();
        let id = tx.generate_new_id();
        for status in ["new", "open", "closed"] {
            tx.add_value(status, "status", id).unwrap();
        }
        id
    };

    let report = store.exclusive().unwrap().trim().unwrap();
    assert_eq!(report.head, TxId::new(4));
    assert_eq!(report.facts_after, 1);

    store.transactor().add_value("reopened", "status", id).unwrap();
    let db = store.current_database();
    assert_eq!(db.tx_id(), TxId::new(5));
    assert_eq!(db.value(id, "status"), Some(Value::from("reopened")));
}
