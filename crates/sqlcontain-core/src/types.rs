//! SQL type definitions and value casting.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// SQL data types a schema column can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal { precision: u8, scale: u8 },

    // Boolean
    Boolean,

    // String types
    VarChar(u32),
    Text,

    // Binary types
    Blob,

    // Date/time types
    Date,
    Time,
    Timestamp,

    // UUID
    Uuid,

    // JSON
    Json,

    // Custom type name (values pass through unchanged)
    Custom(&'static str),
}

/// A cast function, resolved once per declared type.
///
/// Casting is a pure function of the declared type, so callers may memoize
/// the function pointer per column for a whole result stream.
pub type Caster = fn(Value) -> Result<Value>;

impl SqlType {
    /// Get the SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::TinyInt => "TINYINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => (*name).to_string(),
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Resolve the cast function for this type.
    pub fn caster(&self) -> Caster {
        match self {
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                cast_integer
            }
            SqlType::Real | SqlType::Double => cast_float,
            SqlType::Decimal { .. } => cast_decimal,
            SqlType::Boolean => cast_bool,
            SqlType::VarChar(_) | SqlType::Text => cast_text,
            SqlType::Json => cast_json,
            SqlType::Blob
            | SqlType::Date
            | SqlType::Time
            | SqlType::Timestamp
            | SqlType::Uuid
            | SqlType::Custom(_) => cast_passthrough,
        }
    }

    /// Cast a single value. Prefer [`SqlType::caster`] in loops.
    pub fn cast(&self, value: Value) -> Result<Value> {
        (self.caster())(value)
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("{} {}", value.type_name(), value),
        column: None,
    })
}

fn cast_integer(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
            Ok(value.as_i64().map_or(Value::Null, Value::BigInt))
        }
        Value::Bool(b) => Ok(Value::BigInt(i64::from(b))),
        Value::Text(ref s) | Value::Decimal(ref s) => s
            .trim()
            .parse::<i64>()
            .map(Value::BigInt)
            .map_err(|_| mismatch("INTEGER", &value)),
        other => Err(mismatch("INTEGER", &other)),
    }
}

fn cast_float(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Text(ref s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| mismatch("DOUBLE", &value)),
        other => other
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| mismatch("DOUBLE", &other)),
    }
}

fn cast_decimal(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Decimal(_) => Ok(value),
        Value::Text(s) => Ok(Value::Decimal(s)),
        Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::BigInt(_)
        | Value::Float(_)
        | Value::Double(_) => Ok(Value::Decimal(value.to_string())),
        other => Err(mismatch("DECIMAL", &other)),
    }
}

fn cast_bool(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "f" | "false" | "no" | "off" | "" => Ok(Value::Bool(false)),
            _ => Err(mismatch("BOOLEAN", &value)),
        },
        other => other
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| mismatch("BOOLEAN", &other)),
    }
}

fn cast_text(value: Value) -> Result<Value> {
    match value {
        Value::Null | Value::Text(_) => Ok(value),
        Value::Decimal(s) => Ok(Value::Text(s)),
        Value::Bytes(b) => String::from_utf8(b)
            .map(Value::Text)
            .map_err(|e| mismatch("TEXT", &Value::Bytes(e.into_bytes()))),
        Value::Json(serde_json::Value::String(s)) => Ok(Value::Text(s)),
        Value::Json(j) => Ok(Value::Text(j.to_string())),
        other => Ok(Value::Text(other.to_string())),
    }
}

fn cast_json(value: Value) -> Result<Value> {
    match value {
        Value::Null | Value::Json(_) => Ok(value),
        Value::Text(ref s) => serde_json::from_str(s)
            .map(Value::Json)
            .map_err(|_| mismatch("JSON", &value)),
        other => Err(mismatch("JSON", &other)),
    }
}

fn cast_passthrough(value: Value) -> Result<Value> {
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_cast_from_text() {
        assert_eq!(
            SqlType::Integer.cast(Value::from("42")).unwrap(),
            Value::BigInt(42)
        );
        assert_eq!(
            SqlType::BigInt.cast(Value::Int(7)).unwrap(),
            Value::BigInt(7)
        );
        assert!(SqlType::Integer.cast(Value::from("abc")).is_err());
    }

    #[test]
    fn test_null_passes_every_cast() {
        for ty in [
            SqlType::Integer,
            SqlType::Double,
            SqlType::Boolean,
            SqlType::Text,
            SqlType::Json,
            SqlType::Decimal {
                precision: 10,
                scale: 2,
            },
        ] {
            assert_eq!(ty.cast(Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_bool_cast() {
        assert_eq!(
            SqlType::Boolean.cast(Value::from("t")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            SqlType::Boolean.cast(Value::Int(0)).unwrap(),
            Value::Bool(false)
        );
        assert!(SqlType::Boolean.cast(Value::from("maybe")).is_err());
    }

    #[test]
    fn test_text_and_json_casts() {
        assert_eq!(
            SqlType::Text.cast(Value::Int(3)).unwrap(),
            Value::from("3")
        );
        assert_eq!(
            SqlType::Json.cast(Value::from("{\"a\":1}")).unwrap(),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn test_caster_is_stable_per_type() {
        let a = SqlType::Integer.caster();
        let b = SqlType::Integer.caster();
        assert_eq!(a(Value::from("1")).unwrap(), b(Value::from("1")).unwrap());
    }

    #[test]
    fn test_sql_name() {
        assert_eq!(SqlType::VarChar(255).sql_name(), "VARCHAR(255)");
        assert_eq!(
            SqlType::Decimal {
                precision: 10,
                scale: 2
            }
            .sql_name(),
            "DECIMAL(10, 2)"
        );
    }
}
