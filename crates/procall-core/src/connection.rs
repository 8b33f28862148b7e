//! Connection-side collaborators of the callable-statement engine
//!
//! The engine never talks to the wire itself. It drives a [`StatementHandle`]
//! obtained from a [`ConnectionHandle`], hands it [`FieldBinding`]s for the
//! input parameters and reads rows back through a [`RowFetcher`]. All of this
//! happens under the connection-wide [`ConnectionLock`].

use crate::{CallableConfig, ColumnMeta, Result, Value};
use chrono::FixedOffset;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;

/// Mutual exclusion shared by every statement of one connection.
///
/// The wire protocol serializes all traffic of a transaction, so every
/// operation that touches a statement handle or a live cursor runs while
/// holding this lock. Cloning the lock shares it. The lock is reentrant: a
/// statement that already holds it may fetch rows from its own cursor.
#[derive(Clone, Default)]
pub struct ConnectionLock {
    inner: Arc<ReentrantMutex<()>>,
}

impl ConnectionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for the lifetime of the returned guard
    pub fn acquire(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.lock()
    }

    /// Run `f` while holding the lock; the lock is released on every exit path
    pub fn with_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.inner.lock();
        f()
    }

    /// Whether the lock is currently held by someone
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Whether two handles refer to the same underlying lock
    pub fn same_as(&self, other: &ConnectionLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ConnectionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A value bound to one physical parameter position.
///
/// This is the setter side of the field codec: the engine decides which
/// variant a bound input becomes, the statement handle decides how it is
/// serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBinding {
    /// SQL NULL
    Null,
    /// Plain value bound through the generic setter
    Value(Value),
    /// Binary stream with the length the server should expect
    BinaryStream { data: Vec<u8>, length: u64 },
    /// Character stream with the length the server should expect
    CharacterStream { data: String, length: u64 },
    /// Date, time or timestamp decoded in the given calendar
    Temporal {
        value: Value,
        calendar: Option<FixedOffset>,
    },
}

/// Outcome of executing a prepared statement
pub struct ExecuteOutcome {
    /// Row source when the execution produced a result set
    pub rows: Option<Box<dyn RowFetcher>>,
    /// Update count reported by the server, -1 when unknown
    pub update_count: i64,
}

impl ExecuteOutcome {
    /// An execution that produced no rows
    pub fn update(update_count: i64) -> Self {
        Self {
            rows: None,
            update_count,
        }
    }

    /// An execution that produced a result set
    pub fn rows(fetcher: Box<dyn RowFetcher>) -> Self {
        Self {
            rows: Some(fetcher),
            update_count: -1,
        }
    }

    pub fn has_result(&self) -> bool {
        self.rows.is_some()
    }
}

impl std::fmt::Debug for ExecuteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOutcome")
            .field("has_result", &self.has_result())
            .field("update_count", &self.update_count)
            .finish()
    }
}

/// Pull-based source of result rows
pub trait RowFetcher: Send {
    /// Fetch the next row, `None` once the result is exhausted
    fn fetch_next(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Server-side statement handle owned by exactly one callable statement
pub trait StatementHandle: Send {
    /// Prepare the statement text
    fn prepare(&mut self, sql: &str) -> Result<()>;

    /// Whether `prepare` has completed successfully
    fn is_prepared(&self) -> bool;

    /// Number of physical parameter markers of the prepared text
    fn parameter_count(&self) -> usize;

    /// Describe the columns the prepared statement produces
    fn field_descriptors(&self) -> Vec<ColumnMeta>;

    /// Execute with one binding per parameter marker.
    ///
    /// `send_out_params` asks the server to return the singleton row of OUT
    /// values together with the execute response.
    fn execute(&mut self, bindings: &[FieldBinding], send_out_params: bool) -> Result<ExecuteOutcome>;

    /// Release the server-side handle
    fn close(&mut self) -> Result<()>;
}

/// Answers whether a stored procedure is selectable, backed by the server's
/// procedure catalog
pub trait SelectabilityOracle: Send + Sync {
    /// `Some(true)` for selectable, `Some(false)` for executable, `None` when
    /// the catalog has no information about the procedure
    fn is_selectable(&self, procedure: &str) -> Result<Option<bool>>;
}

/// The connection a callable statement is created on
pub trait ConnectionHandle: Send + Sync {
    /// The connection-wide lock
    fn lock(&self) -> ConnectionLock;

    /// Allocate a new, unprepared statement handle
    fn create_statement(&self) -> Result<Box<dyn StatementHandle>>;

    /// Catalog-backed selectability lookup, if the server supports it
    fn selectability(&self) -> Option<&dyn SelectabilityOracle> {
        None
    }

    /// Driver configuration for callable statements
    fn config(&self) -> &CallableConfig;

    /// Called before a statement starts executing
    fn notify_statement_started(&self) {}

    /// Called when a statement execution completes
    fn notify_statement_completed(&self, _success: bool) {}

    /// Check if the connection is closed
    fn is_closed(&self) -> bool {
        false
    }
}
