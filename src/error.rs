use rusqlite::ErrorCode;
use thiserror::Error;

use crate::datatype::CastType;

#[derive(Error, Debug)]
pub enum YankError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Cast error: {0}")]
    Cast(#[from] CastError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("No {table} record matches {criteria}")]
    NotFound { table: String, criteria: String },
    #[error("{count} {table} records match {criteria}, expected one")]
    MultipleMatches { table: String, criteria: String, count: usize },
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Session limit of {limit} reached for {table}")]
    SessionLimitReached { table: String, limit: usize },
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("Invalid url: {0}")]
    Url(String),
}

pub type Result<T> = std::result::Result<T, YankError>;

/// A value that could not be coerced to the declared type of its field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CastError {
    #[error("field '{field}' does not accept null values")]
    Null { field: String },
    #[error("field '{field}' cannot cast {value:?} to {cast}")]
    Incompatible { field: String, value: String, cast: CastType },
    #[error("field '{field}' expects a datetime value, got {value:?}")]
    NotDateTime { field: String, value: String },
}

impl CastError {
    pub fn field(&self) -> &str {
        match self {
            CastError::Null { field }
            | CastError::Incompatible { field, .. }
            | CastError::NotDateTime { field, .. } => field,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Expected during duplicate detection, so kept apart from other failures.
    #[error("Unique constraint violated: {0}")]
    UniqueConstraintViolation(String),
    #[error("{0}")]
    Sqlite(String),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueConstraintViolation(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
    #[error("invalid field name {0:?}")]
    InvalidFieldName(String),
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
    #[error("field 'id' is reserved for the primary key")]
    ReservedField,
    #[error("field '{field}' has an invalid weight {weight}")]
    InvalidWeight { field: String, weight: f64 },
    #[error("unknown cast type {0:?}")]
    UnknownCast(String),
}

// Helper conversions
impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation
                    && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                Self::UniqueConstraintViolation(e.to_string())
            }
            _ => Self::Sqlite(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for YankError {
    fn from(e: rusqlite::Error) -> Self { Self::Storage(e.into()) }
}

impl From<url::ParseError> for YankError {
    fn from(e: url::ParseError) -> Self { Self::Url(e.to_string()) }
}

impl From<config::ConfigError> for YankError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
