//! In-memory procedure server used by the scenario tests.
//!
//! [`FakeServer`] holds a catalog of stored procedures written as Rust
//! closures. Connections obtained from it implement the collaborator traits of
//! `procall-core`: statements are prepared from the rendered call text, the
//! bound values are merged with literal arguments, and the procedure's rows are
//! streamed back through a cursor that counts its fetches.
//!
//! Executable procedures (`EXECUTE PROCEDURE`) answer with a single row of
//! output values when the caller asks for them; selectable procedures
//! (`SELECT * FROM`) answer with every row they produce.
//!
//! # Usage
//!
//! ```rust,ignore
//! use procall_driver_tests::fixtures::{FakeServer, FixtureParser};
//! use procall_callable::CallableStatement;
//!
//! let server = FakeServer::sample();
//! let conn = server.connect();
//! let mut stmt = CallableStatement::prepare_call(conn, &FixtureParser, "{call test_out(?, ?)}")?;
//! ```

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use procall_callable::{CallParser, ProcedureCall};
use procall_core::{
    CallableConfig, ColumnMeta, ConnectionHandle, ConnectionLock, ExecuteOutcome, FieldBinding,
    ProcallError, Result, RowFetcher, SelectabilityOracle, StatementHandle, Value,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Error code the server reports for an unknown procedure
pub const UNKNOWN_PROCEDURE: i32 = 335544581;
/// Error code the server reports for a unique key violation
pub const UNIQUE_KEY_VIOLATION: i32 = 335544665;
/// Error code the server reports for a NOT NULL violation
pub const NOT_NULL_VIOLATION: i32 = 335544347;
/// Error code the server reports for a wrong number of input values
pub const INPUT_MISMATCH: i32 = 335544569;

/// What a procedure body produces
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureOutput {
    /// Output rows, one value per declared output column
    Rows(Vec<Vec<Value>>),
    /// Rows affected by a procedure without outputs
    Update(i64),
}

/// Body of a scripted procedure, called with its input values
pub type ProcedureBody = Arc<dyn Fn(&[Value]) -> Result<ProcedureOutput> + Send + Sync>;

/// A stored procedure known to the fake server
#[derive(Clone)]
pub struct ProcedureDef {
    /// Procedure name, matched case-insensitively
    pub name: String,
    /// Number of input parameters
    pub inputs: usize,
    /// Output columns
    pub outputs: Vec<ColumnMeta>,
    /// Catalog entry: `Some(true)` for selectable procedures, `None` when the
    /// catalog has no procedure type for it
    pub selectable: Option<bool>,
    body: ProcedureBody,
}

impl ProcedureDef {
    /// Define a procedure with the given inputs, output columns and body
    pub fn new(
        name: &str,
        inputs: usize,
        outputs: &[(&str, &str)],
        selectable: Option<bool>,
        body: impl Fn(&[Value]) -> Result<ProcedureOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            inputs,
            outputs: outputs
                .iter()
                .enumerate()
                .map(|(idx, (column, data_type))| ColumnMeta::new(*column, *data_type, idx))
                .collect(),
            selectable,
            body: Arc::new(body),
        }
    }
}

impl std::fmt::Debug for ProcedureDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureDef")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs.len())
            .field("selectable", &self.selectable)
            .finish()
    }
}

/// Counters of the traffic a server has seen
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServerStats {
    /// Statement texts prepared, in order
    pub prepared: Vec<String>,
    /// Number of executions
    pub executions: usize,
    /// Number of row fetches, including the one that found the end
    pub fetches: usize,
    /// Number of statement handles closed
    pub closed_handles: usize,
}

/// Scripted stored-procedure server
pub struct FakeServer {
    procedures: HashMap<String, ProcedureDef>,
    stats: Mutex<ServerStats>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeServer {
    /// An empty server
    pub fn new() -> Self {
        Self {
            procedures: HashMap::new(),
            stats: Mutex::new(ServerStats::default()),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Add a procedure to the catalog
    pub fn with_procedure(mut self, procedure: ProcedureDef) -> Self {
        self.procedures.insert(procedure.name.clone(), procedure);
        self
    }

    /// Make every execution take at least `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Server with the sample procedures used throughout the tests.
    ///
    /// - `FACTORIAL(max_rows, mode)` returns `(ROW_NUM, FACTORIAL)`: every row
    ///   up to `max_rows` with mode 1, only the last one with mode 2, nothing
    ///   otherwise. Selectable.
    /// - `TEST_OUT(in_param)` returns `(OUTPARAM)` echoing its input. Executable.
    /// - `TEST_NO_PARAMS` does nothing. Executable.
    /// - `SELECT_NO_PARAMS` returns one row `('abc')`. Selectable.
    /// - `SET_EMP_PROJ(emp_no, proj_id, last_name, proj_name)` inserts into an
    ///   employee/project table keyed by `(emp_no, proj_id)`. Executable.
    /// - `GET_EMP_PROJ(emp_no)` returns the project ids of an employee in
    ///   order. Selectable.
    /// - `MULT(a, b)` returns `(C)`. Selectable.
    /// - `ADD_ONE(a)` returns `(RESULT)`; not in the procedure-type catalog.
    pub fn sample() -> Arc<Self> {
        Arc::new(Self::sample_catalog())
    }

    /// The catalog of [`sample`](Self::sample) on a server that can still be
    /// configured
    pub fn sample_catalog() -> Self {
        let employee_project: Arc<Mutex<Vec<(i64, String)>>> = Arc::default();
        let insert_table = employee_project.clone();
        let select_table = employee_project;

        Self::new()
            .with_procedure(ProcedureDef::new(
                "factorial",
                2,
                &[("ROW_NUM", "INTEGER"), ("FACTORIAL", "INTEGER")],
                Some(true),
                |args| {
                    let max_rows = int_arg(args, 0)?.unwrap_or(0);
                    let mode = int_arg(args, 1)?.unwrap_or(0);
                    let mut rows = Vec::new();
                    let mut factorial = 1i64;
                    for row_num in 0..=max_rows {
                        if row_num > 0 {
                            factorial *= row_num;
                        }
                        rows.push(vec![Value::Int32(row_num as i32), Value::Int32(factorial as i32)]);
                    }
                    Ok(ProcedureOutput::Rows(match mode {
                        1 => rows,
                        2 => rows.pop().into_iter().collect(),
                        _ => Vec::new(),
                    }))
                },
            ))
            .with_procedure(ProcedureDef::new(
                "test_out",
                1,
                &[("OUTPARAM", "VARCHAR")],
                Some(false),
                |args| Ok(ProcedureOutput::Rows(vec![vec![args[0].clone()]])),
            ))
            .with_procedure(ProcedureDef::new(
                "test_no_params",
                0,
                &[],
                Some(false),
                |_| Ok(ProcedureOutput::Update(0)),
            ))
            .with_procedure(ProcedureDef::new(
                "select_no_params",
                0,
                &[("PROJ_ID", "VARCHAR")],
                Some(true),
                |_| Ok(ProcedureOutput::Rows(vec![vec![Value::String("abc".into())]])),
            ))
            .with_procedure(ProcedureDef::new(
                "set_emp_proj",
                4,
                &[],
                Some(false),
                move |args| {
                    let emp_no = int_arg(args, 0)?.ok_or_else(|| not_null("EMP_NO"))?;
                    let proj_id = match &args[1] {
                        Value::Null => return Err(not_null("PROJ_ID")),
                        other => other.to_string(),
                    };
                    let mut table = insert_table.lock();
                    if table.iter().any(|(e, p)| *e == emp_no && *p == proj_id) {
                        return Err(ProcallError::execution(
                            format!(
                                "violation of PRIMARY or UNIQUE KEY constraint on EMPLOYEE_PROJECT, key ({}, {})",
                                emp_no, proj_id
                            ),
                            UNIQUE_KEY_VIOLATION,
                            "23000",
                        ));
                    }
                    table.push((emp_no, proj_id));
                    Ok(ProcedureOutput::Update(1))
                },
            ))
            .with_procedure(ProcedureDef::new(
                "get_emp_proj",
                1,
                &[("PROJ_ID", "VARCHAR")],
                Some(true),
                move |args| {
                    let emp_no = int_arg(args, 0)?;
                    let mut projects: Vec<String> = select_table
                        .lock()
                        .iter()
                        .filter(|(e, _)| Some(*e) == emp_no)
                        .map(|(_, p)| p.clone())
                        .collect();
                    projects.sort();
                    Ok(ProcedureOutput::Rows(
                        projects.into_iter().map(|p| vec![Value::String(p)]).collect(),
                    ))
                },
            ))
            .with_procedure(ProcedureDef::new(
                "mult",
                2,
                &[("C", "INTEGER")],
                Some(true),
                |args| {
                    let product = match (int_arg(args, 0)?, int_arg(args, 1)?) {
                        (Some(a), Some(b)) => Value::Int64(a * b),
                        _ => Value::Null,
                    };
                    Ok(ProcedureOutput::Rows(vec![vec![product]]))
                },
            ))
            .with_procedure(ProcedureDef::new(
                "add_one",
                1,
                &[("RESULT", "INTEGER")],
                None,
                |args| {
                    let value = int_arg(args, 0)?.map_or(Value::Null, |v| Value::Int64(v + 1));
                    Ok(ProcedureOutput::Rows(vec![vec![value]]))
                },
            ))
    }

    /// Open a connection with the default configuration
    pub fn connect(self: &Arc<Self>) -> Arc<FakeConnection> {
        self.connect_with(CallableConfig::default())
    }

    /// Open a connection with the given configuration
    pub fn connect_with(self: &Arc<Self>, config: CallableConfig) -> Arc<FakeConnection> {
        Arc::new(FakeConnection {
            server: self.clone(),
            lock: ConnectionLock::new(),
            config,
            closed: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> ServerStats {
        self.stats.lock().clone()
    }

    /// Highest number of executions that ever ran at the same time
    pub fn max_concurrent_executions(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn procedure(&self, name: &str) -> Result<&ProcedureDef> {
        self.procedures
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| {
                ProcallError::execution(
                    format!("Dynamic SQL Error; Procedure unknown; {}", name),
                    UNKNOWN_PROCEDURE,
                    "42000",
                )
            })
    }

    fn run(&self, procedure: &ProcedureDef, args: &[Value]) -> Result<ProcedureOutput> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let output = (procedure.body)(args);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        output
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectabilityOracle for FakeServer {
    fn is_selectable(&self, procedure: &str) -> Result<Option<bool>> {
        Ok(self
            .procedures
            .get(&procedure.to_ascii_uppercase())
            .and_then(|p| p.selectable))
    }
}

fn int_arg(args: &[Value], idx: usize) -> Result<Option<i64>> {
    match args.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            ProcallError::execution(
                format!("conversion error from string \"{}\"", value),
                335544334,
                "22018",
            )
        }),
    }
}

fn not_null(column: &str) -> ProcallError {
    ProcallError::execution(
        format!("validation error for column {}, value \"*** null ***\"", column),
        NOT_NULL_VIOLATION,
        "23000",
    )
}

/// Notification a connection received from a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// An execution started
    Started,
    /// An execution completed, successfully or not
    Completed(bool),
}

/// A connection to a [`FakeServer`]
pub struct FakeConnection {
    server: Arc<FakeServer>,
    lock: ConnectionLock,
    config: CallableConfig,
    closed: AtomicBool,
    events: Mutex<Vec<Notification>>,
}

impl FakeConnection {
    /// The server this connection talks to
    pub fn server(&self) -> &Arc<FakeServer> {
        &self.server
    }

    /// Notifications received so far
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    /// Close the connection; statements created on it stop working
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl ConnectionHandle for FakeConnection {
    fn lock(&self) -> ConnectionLock {
        self.lock.clone()
    }

    fn create_statement(&self) -> Result<Box<dyn StatementHandle>> {
        if self.is_closed() {
            return Err(ProcallError::Connection("connection is closed".into()));
        }
        Ok(Box::new(FakeStatement {
            server: self.server.clone(),
            prepared: None,
        }))
    }

    fn selectability(&self) -> Option<&dyn SelectabilityOracle> {
        Some(self.server.as_ref())
    }

    fn config(&self) -> &CallableConfig {
        &self.config
    }

    fn notify_statement_started(&self) {
        self.events.lock().push(Notification::Started);
    }

    fn notify_statement_completed(&self, success: bool) {
        self.events.lock().push(Notification::Completed(success));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallForm {
    Execute,
    Select,
}

#[derive(Debug, Clone, PartialEq)]
enum Argument {
    Marker,
    Literal(Value),
}

struct PreparedCall {
    form: CallForm,
    procedure: ProcedureDef,
    arguments: Vec<Argument>,
}

struct FakeStatement {
    server: Arc<FakeServer>,
    prepared: Option<PreparedCall>,
}

impl FakeStatement {
    fn parse(&self, sql: &str) -> Result<PreparedCall> {
        let (form, rest) = if let Some(rest) = sql.strip_prefix("EXECUTE PROCEDURE ") {
            (CallForm::Execute, rest)
        } else if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
            (CallForm::Select, rest)
        } else {
            return Err(ProcallError::execution(
                format!("Dynamic SQL Error; Token unknown; {}", sql),
                335544634,
                "42000",
            ));
        };

        let (name, args) = match rest.split_once('(') {
            Some((name, args)) => (name.trim(), args.trim_end().trim_end_matches(')')),
            None => (rest.trim(), ""),
        };
        let procedure = self.server.procedure(name)?.clone();
        if form == CallForm::Select && procedure.outputs.is_empty() {
            return Err(ProcallError::execution(
                format!("procedure {} does not return any values", procedure.name),
                335544569,
                "42000",
            ));
        }

        let arguments: Vec<Argument> = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| match a {
                "?" => Argument::Marker,
                literal => Argument::Literal(parse_literal(literal)),
            })
            .collect();
        if arguments.len() != procedure.inputs {
            return Err(ProcallError::execution(
                format!(
                    "Input parameter mismatch for procedure {}: expected {}, got {}",
                    procedure.name,
                    procedure.inputs,
                    arguments.len()
                ),
                INPUT_MISMATCH,
                "07001",
            ));
        }
        Ok(PreparedCall {
            form,
            procedure,
            arguments,
        })
    }
}

fn parse_literal(text: &str) -> Value {
    if let Some(quoted) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Value::String(quoted.replace("''", "'"));
    }
    if text.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    match text.parse::<i64>() {
        Ok(v) => Value::Int64(v),
        Err(_) => Value::Decimal(text.to_string()),
    }
}

fn binding_value(binding: &FieldBinding) -> Value {
    match binding {
        FieldBinding::Null => Value::Null,
        FieldBinding::Value(value) => value.clone(),
        FieldBinding::BinaryStream { data, length } => {
            Value::Bytes(data.iter().take(*length as usize).copied().collect())
        }
        FieldBinding::CharacterStream { data, length } => {
            Value::String(data.chars().take(*length as usize).collect())
        }
        FieldBinding::Temporal { value, .. } => value.clone(),
    }
}

impl StatementHandle for FakeStatement {
    fn prepare(&mut self, sql: &str) -> Result<()> {
        let prepared = self.parse(sql)?;
        self.server.stats.lock().prepared.push(sql.to_string());
        self.prepared = Some(prepared);
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    fn parameter_count(&self) -> usize {
        self.prepared
            .as_ref()
            .map(|p| p.arguments.iter().filter(|a| **a == Argument::Marker).count())
            .unwrap_or_default()
    }

    fn field_descriptors(&self) -> Vec<ColumnMeta> {
        self.prepared
            .as_ref()
            .map(|p| p.procedure.outputs.clone())
            .unwrap_or_default()
    }

    fn execute(&mut self, bindings: &[FieldBinding], send_out_params: bool) -> Result<ExecuteOutcome> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| ProcallError::InvalidState("statement is not prepared".into()))?;
        let markers = self.parameter_count();
        if bindings.len() != markers {
            return Err(ProcallError::execution(
                format!("expected {} parameter values, got {}", markers, bindings.len()),
                INPUT_MISMATCH,
                "07001",
            ));
        }

        let mut bound = bindings.iter();
        let args: Vec<Value> = prepared
            .arguments
            .iter()
            .map(|argument| match argument {
                Argument::Literal(value) => value.clone(),
                Argument::Marker => bound.next().map(binding_value).unwrap_or(Value::Null),
            })
            .collect();

        self.server.stats.lock().executions += 1;
        let output = self.server.run(&prepared.procedure, &args)?;

        let width = prepared.procedure.outputs.len();
        let rows = match (prepared.form, output) {
            (_, ProcedureOutput::Update(count)) => return Ok(ExecuteOutcome::update(count)),
            (CallForm::Select, ProcedureOutput::Rows(rows)) => rows,
            (CallForm::Execute, ProcedureOutput::Rows(_)) if !send_out_params => {
                return Ok(ExecuteOutcome::update(0));
            }
            (CallForm::Execute, ProcedureOutput::Rows(rows)) => {
                let row = rows.into_iter().next().unwrap_or_else(|| vec![Value::Null; width]);
                vec![row]
            }
        };
        Ok(ExecuteOutcome::rows(Box::new(FakeCursor {
            rows: rows.into(),
            server: self.server.clone(),
        })))
    }

    fn close(&mut self) -> Result<()> {
        self.prepared = None;
        self.server.stats.lock().closed_handles += 1;
        Ok(())
    }
}

struct FakeCursor {
    rows: VecDeque<Vec<Value>>,
    server: Arc<FakeServer>,
}

impl RowFetcher for FakeCursor {
    fn fetch_next(&mut self) -> Result<Option<Vec<Value>>> {
        self.server.stats.lock().fetches += 1;
        Ok(self.rows.pop_front())
    }
}

/// Parser for the call escape syntax accepted by the fixtures:
/// `{call name}`, `{call name(args)}`, `{call name args}` and
/// `{?= call name(args)}`. Arguments are `?` markers or literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureParser;

impl CallParser for FixtureParser {
    fn parse_call(&self, sql: &str) -> Result<ProcedureCall> {
        let syntax_error = || ProcallError::InvalidParameter(format!("not a call escape: {}", sql));

        let body = sql
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(syntax_error)?
            .trim();
        let (has_return, rest) = match body.strip_prefix('?') {
            Some(rest) => (
                true,
                rest.trim_start().strip_prefix('=').ok_or_else(syntax_error)?.trim_start(),
            ),
            None => (false, body),
        };
        let rest = match rest.get(..4) {
            Some(keyword) if keyword.eq_ignore_ascii_case("call") => rest[4..].trim(),
            _ => return Err(syntax_error()),
        };

        let split = rest
            .find(|c: char| c == '(' || c.is_whitespace())
            .unwrap_or(rest.len());
        let (name, args) = rest.split_at(split);
        if name.is_empty() {
            return Err(syntax_error());
        }
        let args = args.trim();
        let args = args
            .strip_prefix('(')
            .and_then(|a| a.strip_suffix(')'))
            .unwrap_or(args);

        let mut call = ProcedureCall::new(name);
        if has_return {
            call = call.with_return_value()?;
        }
        for arg in args.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            call = match arg {
                "?" => call.with_placeholder(),
                literal => call.with_literal(literal),
            };
        }
        Ok(call)
    }
}

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("procall=debug,procall_driver_tests=debug"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
});

/// Install the test subscriber once per process.
///
/// Set `RUST_LOG` to override the default `procall=debug` filter.
pub fn init_tracing() {
    Lazy::force(&TRACING);
}
