//! Typed access to column values.
//!
//! The getter side of the field codec: converts a [`Value`] read from a result
//! column into the Rust type the caller asked for, and coerces a column to the
//! [`SqlType`] an OUT parameter was registered with.

use crate::{ProcallError, Result, SqlType, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

/// Conversion from a non-NULL column value
pub trait FromValue: Sized {
    /// Name used in conversion error messages
    const TARGET: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Convert a column value, mapping NULL to `None`
pub fn convert<T: FromValue>(value: &Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    T::from_value(value).map(Some).ok_or_else(|| {
        ProcallError::TypeConversion(format!(
            "cannot convert {} value '{}' to {}",
            value.type_name(),
            value,
            T::TARGET
        ))
    })
}

impl FromValue for String {
    const TARGET: &'static str = "String";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl FromValue for bool {
    const TARGET: &'static str = "bool";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "y" | "1" => Some(true),
                "false" | "f" | "n" | "0" => Some(false),
                _ => None,
            },
            other => other.as_i64().map(|v| v != 0),
        }
    }
}

impl FromValue for i64 {
    const TARGET: &'static str = "i64";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v as i64),
            Value::Float32(v) => float_to_i64(*v as f64),
            Value::Float64(v) => float_to_i64(*v),
            Value::Decimal(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().and_then(float_to_i64)),
            other => other.as_i64(),
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    (v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64).then(|| v.trunc() as i64)
}

impl FromValue for i32 {
    const TARGET: &'static str = "i32";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for i16 {
    const TARGET: &'static str = "i16";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| i16::try_from(v).ok())
    }
}

impl FromValue for f64 {
    const TARGET: &'static str = "f64";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for f32 {
    const TARGET: &'static str = "f32";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl FromValue for Vec<u8> {
    const TARGET: &'static str = "bytes";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            Value::String(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    const TARGET: &'static str = "date";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::DateTimeTz(dt) => Some(dt.naive_local().date()),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FromValue for NaiveTime {
    const TARGET: &'static str = "time";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Time(t) => Some(*t),
            Value::DateTime(dt) => Some(dt.time()),
            Value::DateTimeTz(dt) => Some(dt.naive_local().time()),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    const TARGET: &'static str = "timestamp";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(*dt),
            Value::DateTimeTz(dt) => Some(dt.naive_local()),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

/// Interpret a timestamp column in the given calendar.
///
/// A timestamp without zone is taken as wall-clock time at `offset`; a value
/// that already carries an offset is converted to it.
pub fn timestamp_in_offset(value: &Value, offset: FixedOffset) -> Result<Option<DateTime<FixedOffset>>> {
    if let Value::DateTimeTz(dt) = value {
        return Ok(Some(dt.with_timezone(&offset)));
    }
    let Some(naive) = convert::<NaiveDateTime>(value)? else {
        return Ok(None);
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .map(Some)
        .ok_or_else(|| {
            ProcallError::TypeConversion(format!("timestamp {} is ambiguous at offset {}", naive, offset))
        })
}

/// Coerce a column value to the type an OUT parameter was registered with
pub fn coerce_to(value: &Value, sql_type: SqlType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let coerced = match sql_type {
        SqlType::Boolean => convert::<bool>(value)?.map(Value::Bool),
        SqlType::SmallInt => convert::<i16>(value)?.map(Value::Int16),
        SqlType::Integer => convert::<i32>(value)?.map(Value::Int32),
        SqlType::BigInt => convert::<i64>(value)?.map(Value::Int64),
        SqlType::Float => convert::<f32>(value)?.map(Value::Float32),
        SqlType::Double => convert::<f64>(value)?.map(Value::Float64),
        SqlType::Numeric | SqlType::Decimal => match value {
            Value::Decimal(_) => Some(value.clone()),
            other if other.as_f64().is_some() => Some(Value::Decimal(other.to_string())),
            _ => None,
        },
        SqlType::Char | SqlType::Varchar | SqlType::LongVarchar | SqlType::Clob => {
            convert::<String>(value)?.map(Value::String)
        }
        SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
            convert::<Vec<u8>>(value)?.map(Value::Bytes)
        }
        SqlType::Date => convert::<NaiveDate>(value)?.map(Value::Date),
        SqlType::Time => convert::<NaiveTime>(value)?.map(Value::Time),
        SqlType::Timestamp => convert::<NaiveDateTime>(value)?.map(Value::DateTime),
        SqlType::TimestampWithTimeZone => match value {
            Value::DateTimeTz(_) => Some(value.clone()),
            _ => None,
        },
        SqlType::Null | SqlType::Other => Some(value.clone()),
    };
    coerced.ok_or_else(|| {
        ProcallError::TypeConversion(format!(
            "cannot convert {} value to {:?}",
            value.type_name(),
            sql_type
        ))
    })
}
