//! Procall Callable - stored-procedure calls with positional IN/OUT parameters
//!
//! A [`CallableStatement`] wraps one parsed [`ProcedureCall`]. Input values are
//! bound by ordinal, OUT parameters are registered with the type they should
//! be read as, and execution is deferred-prepared against the connection's
//! statement handle.
//!
//! The server has no real OUT parameters: an executable procedure answers with
//! a single row holding the return value and the OUT values, a selectable
//! procedure with a row set. [`OutputParameterMapper`] translates caller
//! ordinals into result columns, and the singleton row of an executable
//! procedure is copied aside so that reads stay valid however the live cursor
//! is moved.
//!
//! # Example
//!
//! ```ignore
//! use procall_callable::{CallableStatement, ProcedureCall};
//! use procall_core::SqlType;
//!
//! let call = ProcedureCall::new("ADD_ONE").with_placeholders(2);
//! let mut stmt = CallableStatement::new(connection, call)?;
//! stmt.set_i32(1, 41)?;
//! stmt.register_out_parameter(2, SqlType::Integer)?;
//! stmt.execute()?;
//! assert_eq!(stmt.get_i32(2)?, Some(42));
//! ```

mod batch;
mod call;
mod coordinator;
mod mapper;
mod param;
mod result;
mod statement;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod batch_tests;
#[cfg(test)]
mod call_tests;
#[cfg(test)]
mod coordinator_tests;
#[cfg(test)]
mod mapper_tests;
#[cfg(test)]
mod param_tests;
#[cfg(test)]
mod result_tests;
#[cfg(test)]
mod statement_tests;

pub use batch::{BatchExecutor, BatchState};
pub use call::{NATIVE_CALL_COMMAND, NATIVE_SELECT_COMMAND, ProcedureCall};
pub use coordinator::{ExecutionCoordinator, ExecutionState};
pub use mapper::OutputParameterMapper;
pub use param::{ArgumentKind, Direction, ParamValue, ProcedureParam, StreamKind};
pub use result::{CursorPosition, LiveCursorSource, ResultSource, SnapshotSource, assert_has_data};
pub use statement::CallableStatement;

/// Turns call escape syntax such as `{call p(?, ?)}` or `{?= call p(?)}` into
/// a [`ProcedureCall`]
pub trait CallParser: Send + Sync {
    fn parse_call(&self, sql: &str) -> procall_core::Result<ProcedureCall>;
}
