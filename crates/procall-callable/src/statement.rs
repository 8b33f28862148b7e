//! The public callable-statement surface

use crate::CallParser;
use crate::batch::BatchExecutor;
use crate::call::ProcedureCall;
use crate::coordinator::{ExecutionCoordinator, ExecutionState};
use crate::param::ParamValue;
use crate::result::LiveCursorSource;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use procall_core::{
    ColumnMeta, ConnectionHandle, FromValue, ProcallError, Result, SqlType, Value, codec,
};
use std::io::Cursor;
use std::sync::Arc;

/// A stored-procedure call with positional IN and OUT parameters.
///
/// Preparation is deferred until the first execute (or metadata request) so
/// that OUT registrations made after construction still shape the prepared
/// text. OUT values of executable procedures are read from a copy of the
/// single row the server returns; for selectable procedures they are read from
/// the current row of [`results`](Self::results).
#[derive(Debug)]
pub struct CallableStatement {
    coordinator: ExecutionCoordinator,
    batch: BatchExecutor,
    was_null: bool,
}

impl CallableStatement {
    /// Create a statement for an already parsed call
    pub fn new(connection: Arc<dyn ConnectionHandle>, call: ProcedureCall) -> Result<Self> {
        let selectable = resolve_selectability(connection.as_ref(), call.name())?;
        Ok(Self {
            coordinator: ExecutionCoordinator::new(connection, call, selectable)?,
            batch: BatchExecutor::new(),
            was_null: false,
        })
    }

    /// Parse `sql` with `parser` and create a statement for it
    pub fn prepare_call(
        connection: Arc<dyn ConnectionHandle>,
        parser: &dyn CallParser,
        sql: &str,
    ) -> Result<Self> {
        let call = parser.parse_call(sql)?;
        Self::new(connection, call)
    }

    /// Identifier of this statement in log output
    pub fn id(&self) -> &str {
        self.coordinator.id()
    }

    pub fn call(&self) -> &ProcedureCall {
        self.coordinator.call()
    }

    pub fn state(&self) -> ExecutionState {
        self.coordinator.state()
    }

    pub fn is_closed(&self) -> bool {
        self.coordinator.state() == ExecutionState::Closed
    }

    pub fn parameter_count(&self) -> usize {
        self.coordinator.call().parameter_count()
    }

    // Registration

    pub fn register_out_parameter(&mut self, ordinal: usize, sql_type: SqlType) -> Result<()> {
        self.register(ordinal, sql_type, None)
    }

    pub fn register_out_parameter_with_scale(
        &mut self,
        ordinal: usize,
        sql_type: SqlType,
        scale: u32,
    ) -> Result<()> {
        self.register(ordinal, sql_type, Some(scale))
    }

    /// User-defined type names do not exist on the server
    pub fn register_out_parameter_with_type_name(
        &mut self,
        _ordinal: usize,
        _sql_type: SqlType,
        type_name: &str,
    ) -> Result<()> {
        Err(ProcallError::Unsupported(format!(
            "registering OUT parameters by type name ({})",
            type_name
        )))
    }

    pub fn register_out_parameter_by_name(&mut self, name: &str, _sql_type: SqlType) -> Result<()> {
        Err(by_name("registering OUT parameter", name))
    }

    fn register(&mut self, ordinal: usize, sql_type: SqlType, scale: Option<u32>) -> Result<()> {
        let frozen = self.coordinator.is_prepared();
        self.coordinator
            .call_mut()?
            .register_out_param(ordinal, sql_type, scale, frozen)
    }

    // Positional setters

    fn bind(&mut self, ordinal: usize, value: ParamValue) -> Result<()> {
        self.coordinator.call_mut()?.set_input_value(ordinal, value)
    }

    pub fn set_null(&mut self, ordinal: usize) -> Result<()> {
        self.bind(ordinal, ParamValue::Null)
    }

    pub fn set_bool(&mut self, ordinal: usize, value: bool) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Bool(value)))
    }

    pub fn set_i16(&mut self, ordinal: usize, value: i16) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Int16(value)))
    }

    pub fn set_i32(&mut self, ordinal: usize, value: i32) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Int32(value)))
    }

    pub fn set_i64(&mut self, ordinal: usize, value: i64) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Int64(value)))
    }

    pub fn set_f32(&mut self, ordinal: usize, value: f32) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Float32(value)))
    }

    pub fn set_f64(&mut self, ordinal: usize, value: f64) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Float64(value)))
    }

    /// Bind an exact numeric given in its decimal text form
    pub fn set_decimal(&mut self, ordinal: usize, value: impl Into<String>) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Decimal(value.into())))
    }

    pub fn set_string(&mut self, ordinal: usize, value: impl Into<String>) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::String(value.into())))
    }

    pub fn set_bytes(&mut self, ordinal: usize, value: impl Into<Vec<u8>>) -> Result<()> {
        self.bind(ordinal, ParamValue::Scalar(Value::Bytes(value.into())))
    }

    /// Bind any value through the generic setter
    pub fn set_value(&mut self, ordinal: usize, value: impl Into<Value>) -> Result<()> {
        self.bind(ordinal, ParamValue::from(value.into()))
    }

    pub fn set_date(&mut self, ordinal: usize, value: NaiveDate) -> Result<()> {
        self.bind(ordinal, ParamValue::date(value, None))
    }

    pub fn set_date_with_calendar(
        &mut self,
        ordinal: usize,
        value: NaiveDate,
        calendar: FixedOffset,
    ) -> Result<()> {
        self.bind(ordinal, ParamValue::date(value, Some(calendar)))
    }

    pub fn set_time(&mut self, ordinal: usize, value: NaiveTime) -> Result<()> {
        self.bind(ordinal, ParamValue::time(value, None))
    }

    pub fn set_time_with_calendar(
        &mut self,
        ordinal: usize,
        value: NaiveTime,
        calendar: FixedOffset,
    ) -> Result<()> {
        self.bind(ordinal, ParamValue::time(value, Some(calendar)))
    }

    pub fn set_timestamp(&mut self, ordinal: usize, value: NaiveDateTime) -> Result<()> {
        self.bind(ordinal, ParamValue::timestamp(value, None))
    }

    pub fn set_timestamp_with_calendar(
        &mut self,
        ordinal: usize,
        value: NaiveDateTime,
        calendar: FixedOffset,
    ) -> Result<()> {
        self.bind(ordinal, ParamValue::timestamp(value, Some(calendar)))
    }

    /// Bind binary data the server should read as a stream of `length` bytes
    pub fn set_binary_stream(
        &mut self,
        ordinal: usize,
        data: impl Into<Vec<u8>>,
        length: u64,
    ) -> Result<()> {
        self.bind(ordinal, ParamValue::binary_stream(data, length))
    }

    /// Bind text the server should read as a stream of `length` characters
    pub fn set_character_stream(
        &mut self,
        ordinal: usize,
        data: impl Into<String>,
        length: u64,
    ) -> Result<()> {
        self.bind(ordinal, ParamValue::character_stream(data, length))
    }

    // Named parameters do not exist on the server

    pub fn set_null_by_name(&mut self, name: &str) -> Result<()> {
        Err(by_name("setting parameter", name))
    }

    pub fn set_string_by_name(&mut self, name: &str, _value: impl Into<String>) -> Result<()> {
        Err(by_name("setting parameter", name))
    }

    pub fn set_i32_by_name(&mut self, name: &str, _value: i32) -> Result<()> {
        Err(by_name("setting parameter", name))
    }

    pub fn set_i64_by_name(&mut self, name: &str, _value: i64) -> Result<()> {
        Err(by_name("setting parameter", name))
    }

    pub fn set_value_by_name(&mut self, name: &str, _value: impl Into<Value>) -> Result<()> {
        Err(by_name("setting parameter", name))
    }

    // Execution

    /// Execute the call; `true` when it produced a result
    #[tracing::instrument(skip(self), fields(statement = %self.id()))]
    pub fn execute(&mut self) -> Result<bool> {
        let send_out_params = !self.coordinator.is_selectable();
        self.was_null = false;
        self.coordinator.execute(send_out_params)
    }

    /// Execute the call and return its result rows.
    ///
    /// Fails with `NoResult` when the call produced none.
    pub fn execute_query(&mut self) -> Result<&mut LiveCursorSource> {
        if !self.execute()? {
            return Err(ProcallError::NoResult);
        }
        self.coordinator.results()?.ok_or(ProcallError::NoResult)
    }

    /// Execute the call and return its update count, 0 when unknown.
    ///
    /// A call that produces a result does not fail here; its OUT values stay
    /// readable.
    pub fn execute_update(&mut self) -> Result<i64> {
        self.execute()?;
        Ok(self.coordinator.update_count().max(0))
    }

    // Batching

    /// Queue a copy of the current parameter values
    pub fn add_batch(&mut self) -> Result<()> {
        self.coordinator.ensure_open()?;
        self.batch.add(self.coordinator.call())
    }

    pub fn clear_batch(&mut self) -> Result<()> {
        self.coordinator.ensure_open()?;
        self.batch.clear();
        Ok(())
    }

    /// Number of queued calls
    pub fn batch_size(&self) -> usize {
        self.batch.len()
    }

    /// Run the queued calls and return their update counts
    pub fn execute_batch(&mut self) -> Result<Vec<i64>> {
        self.batch.execute(&mut self.coordinator)
    }

    // OUT parameter getters

    fn read_value(&mut self, ordinal: usize) -> Result<Value> {
        let value = self.coordinator.output_value(ordinal)?;
        self.was_null = value.is_null();
        Ok(value)
    }

    fn read<T: FromValue>(&mut self, ordinal: usize) -> Result<Option<T>> {
        let value = self.read_value(ordinal)?;
        codec::convert(&value)
    }

    pub fn get_string(&mut self, ordinal: usize) -> Result<Option<String>> {
        self.read(ordinal)
    }

    pub fn get_bool(&mut self, ordinal: usize) -> Result<Option<bool>> {
        self.read(ordinal)
    }

    pub fn get_i16(&mut self, ordinal: usize) -> Result<Option<i16>> {
        self.read(ordinal)
    }

    pub fn get_i32(&mut self, ordinal: usize) -> Result<Option<i32>> {
        self.read(ordinal)
    }

    pub fn get_i64(&mut self, ordinal: usize) -> Result<Option<i64>> {
        self.read(ordinal)
    }

    pub fn get_f32(&mut self, ordinal: usize) -> Result<Option<f32>> {
        self.read(ordinal)
    }

    pub fn get_f64(&mut self, ordinal: usize) -> Result<Option<f64>> {
        self.read(ordinal)
    }

    /// Exact numeric in its decimal text form
    pub fn get_decimal(&mut self, ordinal: usize) -> Result<Option<String>> {
        let value = self.read_value(ordinal)?;
        match codec::coerce_to(&value, SqlType::Decimal)? {
            Value::Decimal(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }

    pub fn get_bytes(&mut self, ordinal: usize) -> Result<Option<Vec<u8>>> {
        self.read(ordinal)
    }

    pub fn get_date(&mut self, ordinal: usize) -> Result<Option<NaiveDate>> {
        self.read(ordinal)
    }

    pub fn get_time(&mut self, ordinal: usize) -> Result<Option<NaiveTime>> {
        self.read(ordinal)
    }

    pub fn get_timestamp(&mut self, ordinal: usize) -> Result<Option<NaiveDateTime>> {
        self.read(ordinal)
    }

    /// Timestamp interpreted in the given calendar
    pub fn get_timestamp_with_offset(
        &mut self,
        ordinal: usize,
        offset: FixedOffset,
    ) -> Result<Option<DateTime<FixedOffset>>> {
        let value = self.read_value(ordinal)?;
        codec::timestamp_in_offset(&value, offset)
    }

    pub fn get_binary_stream(&mut self, ordinal: usize) -> Result<Option<Cursor<Vec<u8>>>> {
        Ok(self.get_bytes(ordinal)?.map(Cursor::new))
    }

    pub fn get_character_stream(&mut self, ordinal: usize) -> Result<Option<Cursor<String>>> {
        Ok(self.get_string(ordinal)?.map(Cursor::new))
    }

    /// Value of an OUT parameter coerced to its registered type
    pub fn get_value(&mut self, ordinal: usize) -> Result<Value> {
        self.read_value(ordinal)
    }

    /// Value of the result column with the given label
    pub fn get_value_by_name(&mut self, label: &str) -> Result<Value> {
        let value = self.coordinator.value_by_name(label)?;
        self.was_null = value.is_null();
        Ok(value)
    }

    /// Whether the last OUT value read was SQL NULL
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    // Selectability, metadata and lifecycle

    /// Override the selectability the statement was created with
    pub fn set_selectable_procedure(&mut self, selectable: bool) {
        self.coordinator.set_selectable(selectable);
    }

    pub fn is_selectable_procedure(&self) -> bool {
        self.coordinator.is_selectable()
    }

    /// Columns of the prepared call; prepares the statement when needed
    pub fn result_metadata(&mut self) -> Result<Vec<ColumnMeta>> {
        self.coordinator.result_metadata()
    }

    /// Rows of the last execution
    pub fn results(&mut self) -> Result<Option<&mut LiveCursorSource>> {
        self.coordinator.results()
    }

    /// Update count of the last execution, -1 when unknown
    pub fn update_count(&self) -> i64 {
        self.coordinator.update_count()
    }

    pub fn close(&mut self) -> Result<()> {
        self.batch.clear();
        self.coordinator.close()
    }
}

fn resolve_selectability(connection: &dyn ConnectionHandle, procedure: &str) -> Result<bool> {
    let config = connection.config();
    if config.ignore_procedure_type {
        return Ok(false);
    }
    let known = match connection.selectability() {
        Some(oracle) => connection
            .lock()
            .with_lock(|| oracle.is_selectable(procedure))?,
        None => None,
    };
    let selectable = known.unwrap_or(config.default_selectable);
    tracing::trace!(procedure, ?known, selectable, "resolved procedure type");
    Ok(selectable)
}

fn by_name(operation: &str, name: &str) -> ProcallError {
    ProcallError::Unsupported(format!("{} by name ('{}')", operation, name))
}
