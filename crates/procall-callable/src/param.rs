//! Procedure parameters and the values bound to them

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use procall_core::{FieldBinding, ProcallError, Result, SqlType, Value};

/// Kind of data carried by a stream parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Binary,
    Character,
}

/// A bound input value.
///
/// `Clone` is a deep copy: a queued batch entry never shares data with the
/// live descriptor it was copied from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// SQL NULL
    Null,
    /// Any driver-representable value, bound through the generic setter
    Scalar(Value),
    /// Stream data with the length the server should be told about
    Stream {
        kind: StreamKind,
        value: Value,
        length: u64,
    },
    /// Date/time value decoded in an optional calendar
    Temporal {
        value: Value,
        calendar: Option<FixedOffset>,
    },
}

impl ParamValue {
    pub fn binary_stream(data: impl Into<Vec<u8>>, length: u64) -> Self {
        Self::Stream {
            kind: StreamKind::Binary,
            value: Value::Bytes(data.into()),
            length,
        }
    }

    pub fn character_stream(data: impl Into<String>, length: u64) -> Self {
        Self::Stream {
            kind: StreamKind::Character,
            value: Value::String(data.into()),
            length,
        }
    }

    pub fn date(date: NaiveDate, calendar: Option<FixedOffset>) -> Self {
        Self::Temporal {
            value: Value::Date(date),
            calendar,
        }
    }

    pub fn time(time: NaiveTime, calendar: Option<FixedOffset>) -> Self {
        Self::Temporal {
            value: Value::Time(time),
            calendar,
        }
    }

    pub fn timestamp(timestamp: NaiveDateTime, calendar: Option<FixedOffset>) -> Self {
        Self::Temporal {
            value: Value::DateTime(timestamp),
            calendar,
        }
    }

    /// Dispatch on the tag and produce the binding handed to the statement
    /// handle.
    ///
    /// Fails with `TypeConversion` when a stream or temporal wrapper carries a
    /// payload of the wrong kind.
    pub fn to_binding(&self) -> Result<FieldBinding> {
        match self {
            ParamValue::Null => Ok(FieldBinding::Null),
            ParamValue::Scalar(Value::Null) => Ok(FieldBinding::Null),
            ParamValue::Scalar(value) => Ok(FieldBinding::Value(value.clone())),
            ParamValue::Stream { value: Value::Null, .. } => Ok(FieldBinding::Null),
            ParamValue::Stream {
                kind: StreamKind::Binary,
                value: Value::Bytes(data),
                length,
            } => Ok(FieldBinding::BinaryStream {
                data: data.clone(),
                length: *length,
            }),
            ParamValue::Stream {
                kind: StreamKind::Character,
                value: Value::String(data),
                length,
            } => Ok(FieldBinding::CharacterStream {
                data: data.clone(),
                length: *length,
            }),
            ParamValue::Stream { kind, value, .. } => Err(ProcallError::TypeConversion(format!(
                "cannot bind {} value as {:?} stream",
                value.type_name(),
                kind
            ))),
            ParamValue::Temporal { value: Value::Null, .. } => Ok(FieldBinding::Null),
            ParamValue::Temporal { value, calendar } if value.is_temporal() => {
                Ok(FieldBinding::Temporal {
                    value: value.clone(),
                    calendar: *calendar,
                })
            }
            ParamValue::Temporal { value, .. } => Err(ProcallError::TypeConversion(format!(
                "cannot bind {} value with a calendar",
                value.type_name()
            ))),
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            other => ParamValue::Scalar(other),
        }
    }
}

/// Direction of a procedure parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// How an argument appears in the call text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A `?` marker addressed by ordinal
    Placeholder,
    /// A literal expression such as `1` or `'abc'`, rendered verbatim
    Literal(String),
}

/// One argument of a procedure call
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureParam {
    ordinal: Option<usize>,
    direction: Direction,
    registered_type: Option<SqlType>,
    scale: Option<u32>,
    value: Option<ParamValue>,
    kind: ArgumentKind,
}

impl ProcedureParam {
    pub(crate) fn placeholder(ordinal: usize) -> Self {
        Self {
            ordinal: Some(ordinal),
            direction: Direction::In,
            registered_type: None,
            scale: None,
            value: None,
            kind: ArgumentKind::Placeholder,
        }
    }

    pub(crate) fn literal(text: String) -> Self {
        Self {
            ordinal: None,
            direction: Direction::In,
            registered_type: None,
            scale: None,
            value: None,
            kind: ArgumentKind::Literal(text),
        }
    }

    pub(crate) fn return_value(ordinal: usize) -> Self {
        Self {
            direction: Direction::Out,
            ..Self::placeholder(ordinal)
        }
    }

    /// 1-based ordinal, `None` for literal arguments
    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn registered_type(&self) -> Option<SqlType> {
        self.registered_type
    }

    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    pub fn kind(&self) -> &ArgumentKind {
        &self.kind
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == ArgumentKind::Placeholder
    }

    pub fn is_out(&self) -> bool {
        self.direction == Direction::Out
    }

    /// An IN marker that gets bound at execute time
    pub fn is_bindable(&self) -> bool {
        self.is_placeholder() && self.direction == Direction::In
    }

    pub(crate) fn set_value(&mut self, value: ParamValue) {
        self.value = Some(value);
    }

    pub(crate) fn register_out(&mut self, sql_type: SqlType, scale: Option<u32>) {
        if self.direction == Direction::In && self.value.take().is_some() {
            tracing::debug!(
                ordinal = ?self.ordinal,
                "discarding bound input value of parameter registered as OUT"
            );
        }
        self.direction = Direction::Out;
        self.registered_type = Some(sql_type);
        self.scale = scale;
    }

    /// Text of this argument in the rendered call
    pub(crate) fn sql_text(&self) -> &str {
        match &self.kind {
            ArgumentKind::Placeholder => "?",
            ArgumentKind::Literal(text) => text,
        }
    }
}
