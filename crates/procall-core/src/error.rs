//! Error types for procall

use thiserror::Error;

/// SQLSTATE values reported by the callable-statement engine
pub mod sql_state {
    /// No result set (or no row) available to read from
    pub const NO_RESULT_SET: &str = "07005";
    /// Statement produced a result of the wrong kind
    pub const INVALID_STMT_TYPE: &str = "07003";
    /// Invalid descriptor index (parameter ordinal)
    pub const INVALID_DESCRIPTOR_INDEX: &str = "07009";
    /// Invalid character value for cast
    pub const INVALID_CAST: &str = "22018";
    /// Feature not supported
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    /// Function sequence error
    pub const FUNCTION_SEQUENCE: &str = "HY010";
    /// Connection does not exist
    pub const CONNECTION_CLOSED: &str = "08003";
    /// General error
    pub const GENERAL_ERROR: &str = "HY000";
}

/// Core error type for procall operations
#[derive(Error, Debug)]
pub enum ProcallError {
    #[error("No result set for sql")]
    NoResult,

    #[error("Current statement has no data to return")]
    NoData,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    BatchAbort(#[from] BatchAbortError),

    #[error("Statements executed as batch should not produce a result set")]
    UnexpectedResultInBatch,

    #[error("Invalid statement state: {0}")]
    InvalidState(String),

    #[error("Statement is closed")]
    Closed,

    #[error("Execution error: {message}")]
    Execution {
        message: String,
        code: i32,
        sql_state: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcallError {
    /// Create an execution error as reported by the server
    pub fn execution(message: impl Into<String>, code: i32, sql_state: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code,
            sql_state: sql_state.into(),
        }
    }

    /// Vendor error code, 0 when the error did not originate from the server
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Execution { code, .. } => *code,
            Self::BatchAbort(abort) => abort.error_code(),
            _ => 0,
        }
    }

    /// SQLSTATE describing the error class
    pub fn sql_state(&self) -> &str {
        match self {
            Self::NoResult | Self::NoData => sql_state::NO_RESULT_SET,
            Self::InvalidParameter(_) => sql_state::INVALID_DESCRIPTOR_INDEX,
            Self::TypeConversion(_) => sql_state::INVALID_CAST,
            Self::Unsupported(_) => sql_state::FEATURE_NOT_SUPPORTED,
            Self::BatchAbort(abort) => abort.sql_state(),
            Self::UnexpectedResultInBatch => sql_state::INVALID_STMT_TYPE,
            Self::InvalidState(_) | Self::Closed => sql_state::FUNCTION_SEQUENCE,
            Self::Execution { sql_state, .. } => sql_state,
            Self::Connection(_) => sql_state::CONNECTION_CLOSED,
            Self::Configuration(_) | Self::Io(_) => sql_state::GENERAL_ERROR,
        }
    }
}

/// Aggregate failure of a batch run.
///
/// Carries the first failing call's cause together with the update counts of
/// the calls that completed before it.
#[derive(Error, Debug)]
#[error("Batch aborted after {} completed call(s): {cause}", .completed.len())]
pub struct BatchAbortError {
    #[source]
    cause: Box<ProcallError>,
    code: i32,
    sql_state: String,
    completed: Vec<i64>,
}

impl BatchAbortError {
    pub fn new(cause: ProcallError, completed: Vec<i64>) -> Self {
        let code = cause.error_code();
        let sql_state = cause.sql_state().to_string();
        Self {
            cause: Box::new(cause),
            code,
            sql_state,
            completed,
        }
    }

    /// The error raised by the first failing call
    pub fn cause(&self) -> &ProcallError {
        &self.cause
    }

    /// Update counts of the calls that succeeded before the failure
    pub fn completed_counts(&self) -> &[i64] {
        &self.completed
    }

    pub fn error_code(&self) -> i32 {
        self.code
    }

    pub fn sql_state(&self) -> &str {
        &self.sql_state
    }

    pub fn into_cause(self) -> ProcallError {
        *self.cause
    }
}

/// Result type alias for procall operations
pub type Result<T> = std::result::Result<T, ProcallError>;
