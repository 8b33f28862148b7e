//! Result sources OUT parameters are read from
//!
//! A non-selectable procedure returns a single row of OUT values. Right after
//! execution that row is copied into a [`SnapshotSource`] so that OUT reads
//! keep working however the caller moves the live cursor. Selectable
//! procedures stream rows; their OUT parameters are the leading columns of the
//! [`LiveCursorSource`], read row by row.

use procall_core::{
    ColumnMeta, ConnectionLock, ProcallError, Result, Row, RowFetcher, Value,
};
use std::collections::VecDeque;

/// Where a cursor stands relative to its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    BeforeFirst,
    OnRow(usize),
    AfterLast,
}

/// A positioned, forward-only view over result rows
pub trait ResultSource {
    /// Column descriptors of the result
    fn columns(&self) -> &[ColumnMeta];

    fn position(&self) -> CursorPosition;

    /// Move to the next row; `false` once past the last row
    fn next(&mut self) -> Result<bool>;

    /// The row the cursor is positioned on
    fn current_row(&self) -> Option<&Row>;

    /// Value of the 1-based column on the current row
    fn value_at(&self, column: usize) -> Result<&Value> {
        let row = self.current_row().ok_or(ProcallError::NoData)?;
        column
            .checked_sub(1)
            .and_then(|idx| row.get(idx))
            .ok_or_else(|| {
                ProcallError::InvalidParameter(format!(
                    "column index {} is out of range (1..={})",
                    column,
                    row.len()
                ))
            })
    }

    /// 1-based position of the column with the given label
    fn find_column(&self, label: &str) -> Result<usize> {
        self.columns()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(label))
            .map(|idx| idx + 1)
            .ok_or_else(|| ProcallError::InvalidParameter(format!("column '{}' not found", label)))
    }
}

/// Make sure `source` is positioned on a row.
///
/// A cursor that was never moved is advanced once. A cursor that already ran
/// past its rows fails straight away without another fetch.
pub fn assert_has_data(source: &mut dyn ResultSource) -> Result<()> {
    match source.position() {
        CursorPosition::OnRow(_) => Ok(()),
        CursorPosition::AfterLast => Err(ProcallError::NoData),
        CursorPosition::BeforeFirst => {
            if source.next()? {
                Ok(())
            } else {
                Err(ProcallError::NoData)
            }
        }
    }
}

/// Immutable copy of the first row of a non-selectable procedure's result
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    columns: Vec<ColumnMeta>,
    row: Option<Row>,
    position: CursorPosition,
}

impl SnapshotSource {
    pub fn new(columns: Vec<ColumnMeta>, row: Option<Row>) -> Self {
        Self {
            columns,
            row,
            position: CursorPosition::BeforeFirst,
        }
    }

    /// The copied row, if the result had one
    pub fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }
}

impl ResultSource for SnapshotSource {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn position(&self) -> CursorPosition {
        self.position
    }

    fn next(&mut self) -> Result<bool> {
        self.position = match (self.position, &self.row) {
            (CursorPosition::BeforeFirst, Some(_)) => CursorPosition::OnRow(1),
            _ => CursorPosition::AfterLast,
        };
        Ok(matches!(self.position, CursorPosition::OnRow(_)))
    }

    fn current_row(&self) -> Option<&Row> {
        match self.position {
            CursorPosition::OnRow(_) => self.row.as_ref(),
            _ => None,
        }
    }
}

/// Forward-only cursor over the rows the server streams back.
///
/// Fetching touches the wire, so every fetch runs under the connection lock.
pub struct LiveCursorSource {
    columns: Vec<ColumnMeta>,
    column_names: Vec<String>,
    fetcher: Box<dyn RowFetcher>,
    lookahead: VecDeque<Row>,
    current: Option<Row>,
    position: CursorPosition,
    exhausted: bool,
    lock: ConnectionLock,
}

impl LiveCursorSource {
    pub fn new(columns: Vec<ColumnMeta>, fetcher: Box<dyn RowFetcher>, lock: ConnectionLock) -> Self {
        let column_names = columns.iter().map(|c| c.name.clone()).collect();
        Self {
            columns,
            column_names,
            fetcher,
            lookahead: VecDeque::new(),
            current: None,
            position: CursorPosition::BeforeFirst,
            exhausted: false,
            lock,
        }
    }

    fn fetch(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.lookahead.pop_front() {
            return Ok(Some(row));
        }
        if self.exhausted {
            return Ok(None);
        }
        let fetcher = &mut self.fetcher;
        match self.lock.with_lock(|| fetcher.fetch_next())? {
            Some(values) => Ok(Some(Row::new(self.column_names.clone(), values))),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Copy of the first row without moving the cursor.
    ///
    /// Only meaningful before the cursor has been advanced.
    pub fn peek_first(&mut self) -> Result<Option<Row>> {
        if self.position != CursorPosition::BeforeFirst {
            return Ok(None);
        }
        if self.lookahead.is_empty()
            && let Some(row) = self.fetch()?
        {
            self.lookahead.push_back(row);
        }
        Ok(self.lookahead.front().cloned())
    }

    /// 1-based number of the current row, 0 when not on a row
    pub fn row_number(&self) -> usize {
        match self.position {
            CursorPosition::OnRow(n) => n,
            _ => 0,
        }
    }

    /// Typed read of a 1-based column on the current row
    pub fn get<T: procall_core::FromValue>(&self, column: usize) -> Result<Option<T>> {
        procall_core::codec::convert(self.value_at(column)?)
    }

    /// Typed read of a column by label on the current row
    pub fn get_by_name<T: procall_core::FromValue>(&self, label: &str) -> Result<Option<T>> {
        self.get(self.find_column(label)?)
    }

    /// Drain the remaining rows
    pub fn collect_remaining(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while self.next()? {
            if let Some(row) = self.current.clone() {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl ResultSource for LiveCursorSource {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn position(&self) -> CursorPosition {
        self.position
    }

    fn next(&mut self) -> Result<bool> {
        if self.position == CursorPosition::AfterLast {
            return Ok(false);
        }
        match self.fetch()? {
            Some(row) => {
                self.current = Some(row);
                self.position = CursorPosition::OnRow(self.row_number() + 1);
                Ok(true)
            }
            None => {
                self.current = None;
                self.position = CursorPosition::AfterLast;
                Ok(false)
            }
        }
    }

    fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }
}

impl std::fmt::Debug for LiveCursorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCursorSource")
            .field("columns", &self.columns.len())
            .field("position", &self.position)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
