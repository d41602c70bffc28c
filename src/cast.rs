//! Coercion of loosely typed input into the declared type of a field.
//!
//! Used at ingestion time and when casting filter literals. Casting never
//! touches storage.

use crate::datatype::{CastType, Raw, Value};
use crate::error::CastError;
use crate::schema::FieldDescriptor;

const LIST_SEPARATOR: &str = "; ";

pub fn cast(field: &FieldDescriptor, value: Raw) -> Result<Value, CastError> {
    let value = match value {
        Raw::Null if field.nullable => return Ok(Value::Null),
        Raw::Null => return Err(CastError::Null { field: field.name.clone() }),
        // no array columns, so lists are flattened into one unambiguous string
        Raw::List(items) => Raw::Text(join_list(&items)),
        other => other,
    };
    match field.cast {
        CastType::String => Ok(Value::String(match value {
            Raw::Text(s) => s,
            other => other.to_string(),
        })),
        CastType::Integer => cast_integer(field, value),
        CastType::Float => cast_float(field, value),
        CastType::Boolean => cast_boolean(field, value),
        CastType::DateTime => match value {
            Raw::DateTime(dt) => Ok(Value::DateTime(dt)),
            other => Err(CastError::NotDateTime { field: field.name.clone(), value: other.to_string() }),
        },
    }
}

fn join_list(items: &[Raw]) -> String {
    items
        .iter()
        .map(|item| item.to_string().replace(';', ","))
        .collect::<Vec<String>>()
        .join(LIST_SEPARATOR)
}

fn incompatible(field: &FieldDescriptor, value: &Raw) -> CastError {
    CastError::Incompatible { field: field.name.clone(), value: value.to_string(), cast: field.cast }
}

fn cast_integer(field: &FieldDescriptor, value: Raw) -> Result<Value, CastError> {
    match &value {
        Raw::Integer(i) => Ok(Value::Integer(*i)),
        // truncates toward zero
        Raw::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
        Raw::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
        Raw::Text(s) => s
            .replace(',', "")
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| incompatible(field, &value)),
        _ => Err(incompatible(field, &value)),
    }
}

fn cast_float(field: &FieldDescriptor, value: Raw) -> Result<Value, CastError> {
    match &value {
        Raw::Float(f) => Ok(Value::Float(*f)),
        Raw::Integer(i) => Ok(Value::Float(*i as f64)),
        Raw::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| incompatible(field, &value)),
        _ => Err(incompatible(field, &value)),
    }
}

fn cast_boolean(field: &FieldDescriptor, value: Raw) -> Result<Value, CastError> {
    match &value {
        Raw::Boolean(b) => Ok(Value::Boolean(*b)),
        Raw::Integer(i) => Ok(Value::Boolean(*i != 0)),
        Raw::Float(f) => Ok(Value::Boolean(*f != 0.0)),
        Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Boolean(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Boolean(false)),
            _ => Err(incompatible(field, &value)),
        },
        _ => Err(incompatible(field, &value)),
    }
}
