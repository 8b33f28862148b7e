//! Tests for result sources and the empty-result guard

use crate::result::{CursorPosition, LiveCursorSource, ResultSource, SnapshotSource, assert_has_data};
use crate::test_support::{CountingFetcher, columns, int_row};
use pretty_assertions::assert_eq;
use procall_core::{ConnectionLock, ProcallError, Row, Value};

fn live(rows: Vec<Vec<Value>>) -> (LiveCursorSource, std::sync::Arc<parking_lot::Mutex<usize>>) {
    let fetcher = CountingFetcher::new(rows);
    let fetches = fetcher.fetches.clone();
    let source = LiveCursorSource::new(columns(&["A", "B"]), Box::new(fetcher), ConnectionLock::new());
    (source, fetches)
}

#[test]
fn test_assert_has_data_advances_once() {
    let (mut source, fetches) = live(vec![int_row(&[1, 2]), int_row(&[3, 4])]);

    assert_has_data(&mut source).unwrap();
    assert_eq!(source.position(), CursorPosition::OnRow(1));
    assert_has_data(&mut source).unwrap();
    assert_eq!(source.position(), CursorPosition::OnRow(1));
    assert_eq!(*fetches.lock(), 1);
    assert_eq!(source.value_at(2).unwrap(), &Value::Int32(2));
}

#[test]
fn test_empty_result_fails_without_second_advance() {
    let (mut source, fetches) = live(Vec::new());

    assert!(matches!(assert_has_data(&mut source), Err(ProcallError::NoData)));
    assert_eq!(source.position(), CursorPosition::AfterLast);
    assert_eq!(*fetches.lock(), 1);

    assert!(matches!(assert_has_data(&mut source), Err(ProcallError::NoData)));
    assert_eq!(*fetches.lock(), 1);
}

#[test]
fn test_empty_snapshot_fails_twice() {
    let mut snapshot = SnapshotSource::new(columns(&["A"]), None);
    assert!(matches!(assert_has_data(&mut snapshot), Err(ProcallError::NoData)));
    assert!(matches!(assert_has_data(&mut snapshot), Err(ProcallError::NoData)));
    assert_eq!(snapshot.position(), CursorPosition::AfterLast);
}

#[test]
fn test_snapshot_holds_single_row() {
    let row = Row::new(vec!["A".into()], int_row(&[9]));
    let mut snapshot = SnapshotSource::new(columns(&["A"]), Some(row));

    assert_eq!(snapshot.current_row(), None);
    assert_has_data(&mut snapshot).unwrap();
    assert_eq!(snapshot.value_at(1).unwrap(), &Value::Int32(9));
    assert!(!snapshot.next().unwrap());
    assert_eq!(snapshot.current_row(), None);
    assert!(snapshot.row().is_some());
}

#[test]
fn test_peek_first_does_not_move_cursor() {
    let (mut source, fetches) = live(vec![int_row(&[1, 2]), int_row(&[3, 4])]);

    let first = source.peek_first().unwrap().unwrap();
    assert_eq!(first.values, int_row(&[1, 2]));
    assert_eq!(source.position(), CursorPosition::BeforeFirst);

    assert!(source.next().unwrap());
    assert_eq!(source.get::<i32>(1).unwrap(), Some(1));
    assert!(source.next().unwrap());
    assert_eq!(source.get_by_name::<i32>("b").unwrap(), Some(4));
    assert_eq!(source.row_number(), 2);
    assert!(!source.next().unwrap());
    assert_eq!(*fetches.lock(), 3);
}

#[test]
fn test_exhausted_cursor_stops_fetching() {
    let (mut source, fetches) = live(vec![int_row(&[1, 2])]);
    assert_eq!(source.collect_remaining().unwrap().len(), 1);
    assert!(!source.next().unwrap());
    assert!(!source.next().unwrap());
    assert_eq!(*fetches.lock(), 2);
}

#[test]
fn test_value_at_bounds() {
    let (mut source, _) = live(vec![int_row(&[1, 2])]);
    assert!(matches!(source.value_at(1), Err(ProcallError::NoData)));
    source.next().unwrap();
    assert!(matches!(
        source.value_at(0),
        Err(ProcallError::InvalidParameter(_))
    ));
    assert!(matches!(
        source.value_at(3),
        Err(ProcallError::InvalidParameter(_))
    ));
    assert!(matches!(
        source.find_column("C"),
        Err(ProcallError::InvalidParameter(_))
    ));
}

#[test]
fn test_fetch_takes_connection_lock() {
    let lock = ConnectionLock::new();
    let mut source = LiveCursorSource::new(
        columns(&["A"]),
        Box::new(CountingFetcher::new(vec![int_row(&[1])])),
        lock.clone(),
    );

    // Reentrant for the thread that already holds it
    let _guard = lock.acquire();
    assert!(source.next().unwrap());
}
