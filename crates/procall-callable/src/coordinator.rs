//! Statement lifecycle: deferred preparation, execution and OUT reads

use crate::call::ProcedureCall;
use crate::mapper::OutputParameterMapper;
use crate::result::{LiveCursorSource, ResultSource, SnapshotSource, assert_has_data};
use procall_core::{
    ColumnMeta, ConnectionHandle, ConnectionLock, FieldBinding, ProcallError, Result,
    StatementHandle, Value, codec,
};
use std::sync::Arc;

/// Lifecycle state of a callable statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Unprepared,
    Prepared,
    ExecutedWithResult,
    ExecutedNoResult,
    Closed,
}

impl ExecutionState {
    /// Move to `target`, rejecting moves the lifecycle does not allow
    pub fn transition(self, target: ExecutionState) -> Result<ExecutionState> {
        use ExecutionState::*;
        match (self, target) {
            (Closed, Closed) => Ok(Closed),
            (Closed, _) => Err(ProcallError::Closed),
            (_, Closed) => Ok(Closed),
            (Unprepared, Prepared)
            | (Prepared, ExecutedWithResult)
            | (Prepared, ExecutedNoResult)
            | (ExecutedWithResult, Prepared)
            | (ExecutedNoResult, Prepared) => Ok(target),
            (from, to) => Err(ProcallError::InvalidState(format!(
                "cannot move statement from {:?} to {:?}",
                from, to
            ))),
        }
    }

    pub fn is_prepared(self) -> bool {
        !matches!(self, ExecutionState::Unprepared | ExecutionState::Closed)
    }
}

/// Drives one server-side statement handle on behalf of a callable statement.
///
/// Every operation that touches the handle or the result runs under the
/// connection-wide lock.
pub struct ExecutionCoordinator {
    id: String,
    connection: Arc<dyn ConnectionHandle>,
    lock: ConnectionLock,
    handle: Box<dyn StatementHandle>,
    call: ProcedureCall,
    selectable: bool,
    state: ExecutionState,
    snapshot: Option<SnapshotSource>,
    live: Option<LiveCursorSource>,
    update_count: i64,
    result_open: bool,
}

impl ExecutionCoordinator {
    pub fn new(
        connection: Arc<dyn ConnectionHandle>,
        call: ProcedureCall,
        selectable: bool,
    ) -> Result<Self> {
        if connection.is_closed() {
            return Err(ProcallError::Connection("connection is closed".into()));
        }
        let lock = connection.lock();
        let handle = {
            let _guard = lock.acquire();
            connection.create_statement()?
        };
        let id = format!(
            "{}-{}",
            connection.config().statement_name_prefix,
            uuid::Uuid::new_v4()
        );
        tracing::debug!(statement = %id, procedure = %call.name(), selectable, "callable statement created");
        Ok(Self {
            id,
            connection,
            lock,
            handle,
            call,
            selectable,
            state: ExecutionState::Unprepared,
            snapshot: None,
            live: None,
            update_count: -1,
            result_open: false,
        })
    }

    /// Identifier used in log output
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn call(&self) -> &ProcedureCall {
        &self.call
    }

    pub(crate) fn call_mut(&mut self) -> Result<&mut ProcedureCall> {
        self.ensure_open()?;
        Ok(&mut self.call)
    }

    /// Make `call` the active descriptor and hand back the previous one
    pub(crate) fn swap_call(&mut self, call: ProcedureCall) -> ProcedureCall {
        std::mem::replace(&mut self.call, call)
    }

    pub fn lock(&self) -> &ConnectionLock {
        &self.lock
    }

    pub fn is_selectable(&self) -> bool {
        self.selectable
    }

    /// Changes the rendered statement form. A statement that is already
    /// prepared keeps its prepared text, and an open result keeps the source
    /// its OUT values are read from.
    pub fn set_selectable(&mut self, selectable: bool) {
        self.selectable = selectable;
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_prepared()
    }

    pub fn update_count(&self) -> i64 {
        self.update_count
    }

    pub(crate) fn connection(&self) -> &Arc<dyn ConnectionHandle> {
        &self.connection
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state == ExecutionState::Closed {
            return Err(ProcallError::Closed);
        }
        if self.connection.is_closed() {
            return Err(ProcallError::Connection("connection is closed".into()));
        }
        Ok(())
    }

    /// Prepare the rendered call unless a physical handle is already prepared
    pub fn prepare_if_needed(&mut self) -> Result<()> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        self.ensure_open()?;
        if self.state.is_prepared() {
            return Ok(());
        }
        let sql = self.call.sql(self.selectable);
        tracing::debug!(statement = %self.id, sql = %sql, "preparing procedure call");
        self.handle.prepare(&sql)?;
        self.state = self.state.transition(ExecutionState::Prepared)?;
        Ok(())
    }

    fn bindings(&self) -> Result<Vec<FieldBinding>> {
        self.call
            .input_params()
            .enumerate()
            .map(|(idx, param)| {
                let value = param.value().ok_or_else(|| {
                    ProcallError::InvalidParameter(format!(
                        "value of parameter {} is not set",
                        param.ordinal().unwrap_or_default()
                    ))
                })?;
                let binding = value.to_binding()?;
                tracing::trace!(position = idx + 1, ordinal = ?param.ordinal(), ?binding, "bind input");
                Ok(binding)
            })
            .collect()
    }

    /// Drop the result of the previous execution and return to `Prepared`.
    /// An open result is reported to the connection as completed.
    pub(crate) fn reset_results(&mut self) -> Result<()> {
        self.snapshot = None;
        self.live = None;
        self.update_count = -1;
        if self.result_open {
            self.result_open = false;
            self.connection.notify_statement_completed(true);
        }
        if matches!(
            self.state,
            ExecutionState::ExecutedWithResult | ExecutionState::ExecutedNoResult
        ) {
            self.state = self.state.transition(ExecutionState::Prepared)?;
        }
        Ok(())
    }

    /// Execute the active descriptor; `true` when a result was produced
    #[tracing::instrument(skip(self), fields(statement = %self.id, procedure = %self.call.name()))]
    pub fn execute(&mut self, send_out_params: bool) -> Result<bool> {
        self.run(send_out_params, true)
    }

    /// Execute one batch entry. The batch reports start and completion to the
    /// connection once for the whole run.
    pub(crate) fn execute_batch_entry(&mut self, send_out_params: bool) -> Result<bool> {
        self.run(send_out_params, false)
    }

    fn run(&mut self, send_out_params: bool, notify: bool) -> Result<bool> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        self.ensure_open()?;
        self.call.check_parameters()?;
        self.prepare_if_needed()?;
        let bindings = self.bindings()?;
        self.reset_results()?;

        if notify {
            self.connection.notify_statement_started();
        }
        let outcome = match self.handle.execute(&bindings, send_out_params) {
            Ok(outcome) => outcome,
            Err(e) => {
                if notify {
                    self.connection.notify_statement_completed(false);
                }
                return Err(e);
            }
        };
        self.update_count = outcome.update_count;

        let Some(fetcher) = outcome.rows else {
            self.state = self.state.transition(ExecutionState::ExecutedNoResult)?;
            if notify {
                self.connection.notify_statement_completed(true);
            }
            tracing::debug!(update_count = self.update_count, "procedure executed");
            return Ok(false);
        };

        let columns = self.handle.field_descriptors();
        let mut live = LiveCursorSource::new(columns.clone(), fetcher, self.lock.clone());
        if !self.selectable {
            match live.peek_first() {
                Ok(first) => self.snapshot = Some(SnapshotSource::new(columns, first)),
                Err(e) => {
                    self.state = self.state.transition(ExecutionState::ExecutedNoResult)?;
                    if notify {
                        self.connection.notify_statement_completed(false);
                    }
                    return Err(e);
                }
            }
        }
        self.live = Some(live);
        self.result_open = notify;
        self.state = self.state.transition(ExecutionState::ExecutedWithResult)?;
        tracing::debug!(snapshot = self.snapshot.is_some(), "procedure produced a result");
        Ok(true)
    }

    pub fn has_result(&self) -> bool {
        self.live.is_some()
    }

    /// The source OUT values are read from. It is fixed when the result is
    /// produced: the snapshot taken for an executable call, the live cursor
    /// otherwise. Changing the procedure type later does not move it.
    fn authoritative(&mut self) -> Result<&mut dyn ResultSource> {
        let source: Option<&mut dyn ResultSource> = match self.snapshot.as_mut() {
            Some(snapshot) => Some(snapshot as &mut dyn ResultSource),
            None => self.live.as_mut().map(|l| l as &mut dyn ResultSource),
        };
        source.ok_or(ProcallError::NoData)
    }

    /// Value of the OUT parameter with the given ordinal, coerced to its
    /// registered type
    pub fn output_value(&mut self, ordinal: usize) -> Result<Value> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        self.ensure_open()?;
        let column = OutputParameterMapper::to_result_column(&self.call, ordinal)?;
        let registered = self.call.param(ordinal)?.registered_type();
        let source = self.authoritative()?;
        assert_has_data(source)?;
        let value = source.value_at(column)?;
        match registered {
            Some(sql_type) => codec::coerce_to(value, sql_type),
            None => Ok(value.clone()),
        }
    }

    /// Value of the result column with the given label, without OUT remapping
    pub fn value_by_name(&mut self, label: &str) -> Result<Value> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        self.ensure_open()?;
        let source = self.authoritative()?;
        assert_has_data(source)?;
        let column = source.find_column(label)?;
        source.value_at(column).cloned()
    }

    /// Column descriptors of the prepared call
    pub fn result_metadata(&mut self) -> Result<Vec<ColumnMeta>> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        self.prepare_if_needed()?;
        Ok(self.handle.field_descriptors())
    }

    /// The live cursor of the last execution
    pub fn results(&mut self) -> Result<Option<&mut LiveCursorSource>> {
        self.ensure_open()?;
        Ok(self.live.as_mut())
    }

    /// Release the result and the server-side handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let lock = self.lock.clone();
        let _guard = lock.acquire();
        if self.state == ExecutionState::Closed {
            return Ok(());
        }
        self.snapshot = None;
        self.live = None;
        if self.result_open {
            self.result_open = false;
            self.connection.notify_statement_completed(true);
        }
        let closed = self.handle.close();
        self.state = self.state.transition(ExecutionState::Closed)?;
        tracing::debug!(statement = %self.id, "callable statement closed");
        closed
    }
}

impl Drop for ExecutionCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(statement = %self.id, error = %e, "failed to close statement handle");
        }
    }
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("id", &self.id)
            .field("procedure", &self.call.name())
            .field("selectable", &self.selectable)
            .field("state", &self.state)
            .field("update_count", &self.update_count)
            .finish()
    }
}
