//! Tests for the connection lock and execute outcomes

use crate::{ConnectionLock, ExecuteOutcome, Result, RowFetcher, Value};
use pretty_assertions::assert_eq;
use std::thread;

struct NoRows;

impl RowFetcher for NoRows {
    fn fetch_next(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(None)
    }
}

#[test]
fn test_with_lock_releases() {
    let lock = ConnectionLock::new();
    let value = lock.with_lock(|| {
        assert!(lock.is_locked());
        42
    });
    assert_eq!(value, 42);
    assert!(!lock.is_locked());
}

#[test]
fn test_lock_is_reentrant() {
    let lock = ConnectionLock::new();
    let _outer = lock.acquire();
    let inner = lock.with_lock(|| lock.with_lock(|| "nested"));
    assert_eq!(inner, "nested");
}

#[test]
fn test_clones_share_the_lock() {
    let lock = ConnectionLock::new();
    let shared = lock.clone();
    assert!(lock.same_as(&shared));
    assert!(!lock.same_as(&ConnectionLock::new()));

    let _guard = lock.acquire();
    let seen_locked = thread::spawn(move || shared.is_locked())
        .join()
        .unwrap();
    assert!(seen_locked);
}

#[test]
fn test_execute_outcome() {
    let update = ExecuteOutcome::update(3);
    assert!(!update.has_result());
    assert_eq!(update.update_count, 3);

    let rows = ExecuteOutcome::rows(Box::new(NoRows));
    assert!(rows.has_result());
    assert_eq!(rows.update_count, -1);
}
