//! In-memory statement handles for unit tests

use parking_lot::{Mutex, MutexGuard};
use procall_core::{
    CallableConfig, ColumnMeta, ConnectionHandle, ConnectionLock, ExecuteOutcome, FieldBinding,
    ProcallError, Result, RowFetcher, SelectabilityOracle, StatementHandle, Value,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// What the server answers to the next execute
pub(crate) enum Reply {
    Rows(Vec<Vec<Value>>),
    Update(i64),
    Fail(ProcallError),
}

#[derive(Default)]
pub(crate) struct ServerLog {
    pub prepared: Vec<String>,
    pub executions: Vec<Vec<FieldBinding>>,
    pub send_out_params: Vec<bool>,
    pub events: Vec<&'static str>,
    pub fetches: usize,
    pub closed: usize,
    /// Whether the connection lock was held, per catalog lookup
    pub lookups_locked: Vec<bool>,
    replies: VecDeque<Reply>,
}

struct MockOracle {
    answer: Option<bool>,
    lock: ConnectionLock,
    log: Arc<Mutex<ServerLog>>,
}

impl SelectabilityOracle for MockOracle {
    fn is_selectable(&self, _procedure: &str) -> Result<Option<bool>> {
        self.log.lock().lookups_locked.push(self.lock.is_locked());
        Ok(self.answer)
    }
}

pub(crate) struct MockConnection {
    lock: ConnectionLock,
    config: CallableConfig,
    columns: Vec<ColumnMeta>,
    oracle: Option<MockOracle>,
    log: Arc<Mutex<ServerLog>>,
}

impl MockConnection {
    /// A connection whose statements describe the given result columns
    pub fn new(names: &[&str]) -> Self {
        Self {
            lock: ConnectionLock::new(),
            config: CallableConfig::default(),
            columns: columns(names),
            oracle: None,
            log: Arc::default(),
        }
    }

    pub fn with_oracle(mut self, answer: Option<bool>) -> Self {
        self.oracle = Some(MockOracle {
            answer,
            lock: self.lock.clone(),
            log: self.log.clone(),
        });
        self
    }

    pub fn with_config(mut self, config: CallableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.log.lock().replies.push_back(reply);
        self
    }

    pub fn push_reply(&self, reply: Reply) {
        self.log.lock().replies.push_back(reply);
    }

    pub fn log(&self) -> MutexGuard<'_, ServerLog> {
        self.log.lock()
    }

    pub fn into_arc(self) -> Arc<MockConnection> {
        Arc::new(self)
    }
}

impl ConnectionHandle for MockConnection {
    fn lock(&self) -> ConnectionLock {
        self.lock.clone()
    }

    fn create_statement(&self) -> Result<Box<dyn StatementHandle>> {
        Ok(Box::new(MockHandle {
            log: self.log.clone(),
            columns: self.columns.clone(),
            sql: None,
        }))
    }

    fn selectability(&self) -> Option<&dyn SelectabilityOracle> {
        self.oracle.as_ref().map(|o| o as &dyn SelectabilityOracle)
    }

    fn config(&self) -> &CallableConfig {
        &self.config
    }

    fn notify_statement_started(&self) {
        self.log.lock().events.push("started");
    }

    fn notify_statement_completed(&self, success: bool) {
        self.log
            .lock()
            .events
            .push(if success { "completed" } else { "failed" });
    }
}

struct MockHandle {
    log: Arc<Mutex<ServerLog>>,
    columns: Vec<ColumnMeta>,
    sql: Option<String>,
}

impl StatementHandle for MockHandle {
    fn prepare(&mut self, sql: &str) -> Result<()> {
        self.log.lock().prepared.push(sql.to_string());
        self.sql = Some(sql.to_string());
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.sql.is_some()
    }

    fn parameter_count(&self) -> usize {
        self.sql
            .as_deref()
            .map(|s| s.matches('?').count())
            .unwrap_or_default()
    }

    fn field_descriptors(&self) -> Vec<ColumnMeta> {
        self.columns.clone()
    }

    fn execute(&mut self, bindings: &[FieldBinding], send_out_params: bool) -> Result<ExecuteOutcome> {
        let reply = {
            let mut log = self.log.lock();
            log.executions.push(bindings.to_vec());
            log.send_out_params.push(send_out_params);
            log.replies.pop_front().unwrap_or(Reply::Update(1))
        };
        match reply {
            Reply::Rows(rows) => Ok(ExecuteOutcome::rows(Box::new(MockFetcher {
                rows: rows.into(),
                log: self.log.clone(),
            }))),
            Reply::Update(count) => Ok(ExecuteOutcome::update(count)),
            Reply::Fail(e) => Err(e),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().closed += 1;
        Ok(())
    }
}

struct MockFetcher {
    rows: VecDeque<Vec<Value>>,
    log: Arc<Mutex<ServerLog>>,
}

impl RowFetcher for MockFetcher {
    fn fetch_next(&mut self) -> Result<Option<Vec<Value>>> {
        self.log.lock().fetches += 1;
        Ok(self.rows.pop_front())
    }
}

/// Fetcher over fixed rows that counts its fetches
pub(crate) struct CountingFetcher {
    rows: VecDeque<Vec<Value>>,
    pub fetches: Arc<Mutex<usize>>,
}

impl CountingFetcher {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into(),
            fetches: Arc::default(),
        }
    }
}

impl RowFetcher for CountingFetcher {
    fn fetch_next(&mut self) -> Result<Option<Vec<Value>>> {
        *self.fetches.lock() += 1;
        Ok(self.rows.pop_front())
    }
}

pub(crate) fn columns(names: &[&str]) -> Vec<ColumnMeta> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnMeta::new(*name, "INTEGER", idx))
        .collect()
}

pub(crate) fn int_row(values: &[i32]) -> Vec<Value> {
    values.iter().copied().map(Value::Int32).collect()
}
