// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, SecondsFormat, Utc};

// used when declaring schemas from configuration
use serde::{Deserialize, Serialize};

// used to print out readable forms of a value
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

// ------------- Cast Types --------------
/// The fixed set of column types a field can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastType {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
}

impl CastType {
    pub const ALL: [CastType; 5] = [
        CastType::String,
        CastType::Integer,
        CastType::Float,
        CastType::Boolean,
        CastType::DateTime,
    ];
    /// Declared SQLite column type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            CastType::String => "TEXT",
            CastType::Integer => "INTEGER",
            CastType::Float => "REAL",
            CastType::Boolean => "BOOLEAN",
            CastType::DateTime => "DATETIME",
        }
    }
    pub fn is_string(&self) -> bool {
        matches!(self, CastType::String)
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CastType::String => "String",
            CastType::Integer => "Integer",
            CastType::Float => "Float",
            CastType::Boolean => "Boolean",
            CastType::DateTime => "DateTime",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for CastType {
    type Err = SchemaError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(CastType::String),
            "integer" | "int" => Ok(CastType::Integer),
            "float" | "real" => Ok(CastType::Float),
            "boolean" | "bool" => Ok(CastType::Boolean),
            "datetime" => Ok(CastType::DateTime),
            _ => Err(SchemaError::UnknownCast(s.to_string())),
        }
    }
}

// ------------- Values --------------
/// A value already cast to the declared type of its field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
    /// Reads a stored column back into the representation of its cast type.
    pub fn convert(cast: CastType, value: ValueRef<'_>) -> FromSqlResult<Value> {
        if let ValueRef::Null = value {
            return Ok(Value::Null);
        }
        match cast {
            CastType::String => match value {
                ValueRef::Text(_) => Ok(Value::String(String::column_result(value)?)),
                ValueRef::Integer(i) => Ok(Value::String(i.to_string())),
                ValueRef::Real(f) => Ok(Value::String(f.to_string())),
                _ => Err(FromSqlError::InvalidType),
            },
            CastType::Integer => Ok(Value::Integer(value.as_i64()?)),
            CastType::Float => match value {
                ValueRef::Integer(i) => Ok(Value::Float(i as f64)),
                _ => Ok(Value::Float(value.as_f64()?)),
            },
            CastType::Boolean => Ok(Value::Boolean(value.as_i64()? != 0)),
            CastType::DateTime => Ok(Value::DateTime(DateTime::<Utc>::column_result(value)?)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            Value::String(s) => Ok(ToSqlOutput::from(s.as_str())),
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::Boolean(b) => Ok(ToSqlOutput::from(*b)),
            Value::DateTime(dt) => dt.to_sql(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

// ------------- Raw input --------------
/// A loosely typed value as handed over by an extraction callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    List(Vec<Raw>),
}

impl Raw {
    pub fn is_null(&self) -> bool {
        matches!(self, Raw::Null)
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Raw::Null => write!(f, "None"),
            Raw::Text(s) => write!(f, "{}", s),
            Raw::Integer(i) => write!(f, "{}", i),
            Raw::Float(x) => write!(f, "{}", x),
            Raw::Boolean(b) => write!(f, "{}", b),
            Raw::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Raw::List(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

impl From<&str> for Raw {
    fn from(s: &str) -> Self { Raw::Text(s.to_string()) }
}
impl From<String> for Raw {
    fn from(s: String) -> Self { Raw::Text(s) }
}
impl From<&String> for Raw {
    fn from(s: &String) -> Self { Raw::Text(s.clone()) }
}
impl From<i64> for Raw {
    fn from(i: i64) -> Self { Raw::Integer(i) }
}
impl From<i32> for Raw {
    fn from(i: i32) -> Self { Raw::Integer(i64::from(i)) }
}
impl From<u32> for Raw {
    fn from(i: u32) -> Self { Raw::Integer(i64::from(i)) }
}
impl From<f64> for Raw {
    fn from(f: f64) -> Self { Raw::Float(f) }
}
impl From<bool> for Raw {
    fn from(b: bool) -> Self { Raw::Boolean(b) }
}
impl From<DateTime<Utc>> for Raw {
    fn from(dt: DateTime<Utc>) -> Self { Raw::DateTime(dt) }
}
impl<T: Into<Raw>> From<Vec<T>> for Raw {
    fn from(items: Vec<T>) -> Self { Raw::List(items.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Raw>> From<Option<T>> for Raw {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Raw::Null,
        }
    }
}
impl From<Value> for Raw {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Raw::Null,
            Value::String(s) => Raw::Text(s),
            Value::Integer(i) => Raw::Integer(i),
            Value::Float(f) => Raw::Float(f),
            Value::Boolean(b) => Raw::Boolean(b),
            Value::DateTime(dt) => Raw::DateTime(dt),
        }
    }
}
impl From<serde_json::Value> for Raw {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Raw::Null,
            serde_json::Value::Bool(b) => Raw::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Raw::Integer(i),
                None => n.as_f64().map(Raw::Float).unwrap_or(Raw::Null),
            },
            serde_json::Value::String(s) => Raw::Text(s),
            serde_json::Value::Array(items) => Raw::List(items.into_iter().map(Raw::from).collect()),
            object => Raw::Text(object.to_string()),
        }
    }
}
