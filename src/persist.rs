// used for persistence
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row};

// used for timestamps in the database
use chrono::{DateTime, Utc};

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::datatype::{CastType, Raw, Value};
use crate::error::{CastError, Result, StorageError, YankError};
use crate::schema::{FieldOptions, RecordSchema, SchemaBuilder, ID, URL, YANKED_AT};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const LIST_VIEW: &str = "list";
const DETAIL_VIEW: &str = "detail";

// ------------- Records -------------
/// One stored (or about to be stored) row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<i64>,
    values: HashMap<String, Value>,
}

impl Record {
    /// The value of any column, `id` included.
    pub fn value(&self, name: &str) -> Option<Value> {
        if name == ID {
            return Some(self.id.map(Value::Integer).unwrap_or(Value::Null));
        }
        self.values.get(name).cloned()
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
    pub fn url(&self) -> &str {
        self.values.get(URL).and_then(Value::as_str).unwrap_or_default()
    }
    pub fn yanked_at(&self) -> Option<&DateTime<Utc>> {
        self.values.get(YANKED_AT).and_then(Value::as_datetime)
    }
    /// Stringified value for display, `N/A` when the column is unknown.
    pub fn display(&self, name: &str) -> String {
        self.value(name).map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
    }
}

// ------------- Selections -------------
/// A compiled `where` and `order by` over one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub conditions: Vec<String>,
    pub params: Vec<Value>,
    pub order: Vec<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn and(&mut self, condition: String, params: impl IntoIterator<Item = Value>) {
        self.conditions.push(condition);
        self.params.extend(params);
    }
    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" where {}", self.conditions.join(" and "))
        }
    }
    fn order_clause(&self) -> String {
        if self.order.is_empty() {
            String::new()
        } else {
            format!(" order by {}", self.order.join(", "))
        }
    }
}

pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

// ------------- Record Store -------------
pub struct RecordStore<'db> {
    db: &'db Connection,
    schema: &'db RecordSchema,
}

impl<'db> RecordStore<'db> {
    pub fn new(db: &'db Connection, schema: &'db RecordSchema) -> Self {
        Self { db, schema }
    }
    pub fn schema(&self) -> &'db RecordSchema {
        self.schema
    }
    pub fn table(&self) -> &'db str {
        self.schema.table()
    }

    /// Creates the table (and its url index) mirroring the schema.
    pub fn create_table(&self) -> Result<()> {
        let table = self.schema.table();
        let mut columns = vec![format!("{} integer primary key autoincrement", quote(ID))];
        for field in self.schema.columns() {
            let mut column = format!("{} {}", quote(&field.name), field.cast.sql_type());
            if !field.nullable {
                column.push_str(" not null");
            }
            if field.unique {
                column.push_str(" unique");
            }
            columns.push(column);
        }
        self.db.execute_batch(&format!(
            "
            create table if not exists {table} (
                {columns}
            );
            create index if not exists {index} on {table} ({url});
            ",
            table = quote(table),
            columns = columns.join(",\n                "),
            index = quote(&format!("{}_url", table)),
            url = quote(URL),
        ))?;
        Ok(())
    }

    /// Casts the supplied values into an unpersisted record, ignoring keys
    /// that are not part of the schema.
    pub fn create<K, V>(&self, values: impl IntoIterator<Item = (K, V)>) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Raw>,
    {
        let mut raw: HashMap<String, Raw> = values
            .into_iter()
            .filter(|(k, _)| self.schema.columns().any(|f| f.name == k.as_ref()))
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        raw.entry(YANKED_AT.to_string()).or_insert_with(|| Raw::DateTime(Utc::now()));
        let mut cast = HashMap::new();
        for field in self.schema.columns() {
            let value = raw.remove(&field.name).unwrap_or(Raw::Null);
            cast.insert(field.name.clone(), field.cast(value)?);
        }
        Ok(Record { id: None, values: cast })
    }

    /// Writes the record, assigning its id when it has none.
    pub fn insert(&self, record: &mut Record) -> Result<i64> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = record.id {
            names.push(quote(ID));
            values.push(Value::Integer(id));
        }
        for field in self.schema.columns() {
            names.push(quote(&field.name));
            values.push(record.values.get(&field.name).cloned().unwrap_or(Value::Null));
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "insert into {} ({}) values ({})",
            quote(self.schema.table()),
            names.join(", "),
            placeholders
        );
        self.db
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))?;
        let id = record.id.unwrap_or_else(|| self.db.last_insert_rowid());
        record.id = Some(id);
        debug!(table = self.schema.table(), id, "inserted record");
        Ok(id)
    }

    pub fn count(&self) -> Result<usize> {
        self.count_where(&Selection::new())
    }

    /// True when a record matches every equality. Unknown fields are ignored.
    pub fn exists<K, V>(&self, equalities: impl IntoIterator<Item = (K, V)>) -> Result<bool>
    where
        K: AsRef<str>,
        V: Into<Raw>,
    {
        let selection = self.equalities(equalities)?;
        let sql = format!(
            "select exists (select 1 from {}{})",
            quote(self.schema.table()),
            selection.where_clause()
        );
        let found: bool = self
            .db
            .prepare_cached(&sql)?
            .query_row(params_from_iter(selection.params.iter()), |r| r.get(0))?;
        Ok(found)
    }

    /// Exactly one record matching every equality.
    pub fn get<K, V>(&self, equalities: impl IntoIterator<Item = (K, V)>) -> Result<Record>
    where
        K: AsRef<str>,
        V: Into<Raw>,
    {
        let equalities: Vec<(String, Raw)> = equalities
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        let criteria = equalities
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<String>>()
            .join(", ");
        let selection = self.equalities(equalities)?;
        // two rows are enough to tell one match from many
        let mut records = self.select(&selection, 0, Some(2))?;
        match records.len() {
            0 => Err(YankError::NotFound { table: self.schema.table().to_string(), criteria }),
            1 => Ok(records.remove(0)),
            _ => Err(YankError::MultipleMatches {
                table: self.schema.table().to_string(),
                count: self.count_where(&selection)?,
                criteria,
            }),
        }
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.select(&Selection::new(), 0, None)
    }

    pub fn select(&self, selection: &Selection, offset: usize, limit: Option<usize>) -> Result<Vec<Record>> {
        let columns: Vec<String> = self.schema.all_fields().map(|f| quote(&f.name)).collect();
        let sql = format!(
            "select {} from {}{}{} limit ? offset ?",
            columns.join(", "),
            quote(self.schema.table()),
            selection.where_clause(),
            selection.order_clause()
        );
        let mut params = selection.params.clone();
        params.push(Value::Integer(limit.map(|l| l as i64).unwrap_or(-1)));
        params.push(Value::Integer(offset as i64));
        let mut statement = self.db.prepare_cached(&sql)?;
        let rows = statement.query_map(params_from_iter(params.iter()), |row| read_record(self.schema, row))?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    pub fn count_where(&self, selection: &Selection) -> Result<usize> {
        let sql = format!(
            "select count(*) from {}{}",
            quote(self.schema.table()),
            selection.where_clause()
        );
        let count: i64 = self
            .db
            .prepare_cached(&sql)?
            .query_row(params_from_iter(selection.params.iter()), |r| r.get(0))?;
        Ok(count as usize)
    }

    fn equalities<K, V>(&self, equalities: impl IntoIterator<Item = (K, V)>) -> std::result::Result<Selection, CastError>
    where
        K: AsRef<str>,
        V: Into<Raw>,
    {
        let mut selection = Selection::new();
        for (name, value) in equalities {
            let Some(field) = self.schema.field(name.as_ref()) else {
                debug!(table = self.schema.table(), field = name.as_ref(), "ignoring unknown field");
                continue;
            };
            let raw = value.into();
            if raw.is_null() {
                selection.and(format!("{} is null", quote(&field.name)), []);
                continue;
            }
            let value = field.cast(raw)?;
            selection.and(format!("{} = ?", quote(&field.name)), [value]);
        }
        Ok(selection)
    }
}

fn read_record(schema: &RecordSchema, row: &Row) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let mut values = HashMap::new();
    for (i, field) in schema.columns().enumerate() {
        let index = i + 1;
        let raw = row.get_ref(index)?;
        let value = Value::convert(field.cast, raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, raw.data_type(), Box::new(e))
        })?;
        values.insert(field.name.clone(), value);
    }
    Ok(Record { id: Some(id), values })
}

// ------------- Registry -------------
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

/// Owns the connection of a collection run and the schemas registered on it.
pub struct Registry {
    db: Connection,
    name: String,
    schemas: Vec<RecordSchema>,
}

impl Registry {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let (db, name) = match &mode {
            PersistenceMode::InMemory => (Connection::open_in_memory()?, ":memory:".to_string()),
            PersistenceMode::File(path) => (
                Connection::open(path)?,
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            ),
        };
        add_regexp_function(&db)?;
        add_lower_function(&db)?;
        db.execute_batch(
            "
            create table if not exists yank_field (
                table_name text not null,
                position integer not null,
                field text not null,
                cast_type text not null,
                display text not null,
                nullable integer not null,
                is_unique integer not null,
                weight real null,
                constraint unique_yank_field primary key (
                    table_name,
                    field
                )
            );
            create table if not exists yank_display (
                table_name text not null,
                view text not null,
                position integer not null,
                field text not null,
                label text not null,
                constraint unique_yank_display primary key (
                    table_name,
                    view,
                    position
                )
            );
            ",
        )?;
        let mut registry = Self { db, name, schemas: Vec::new() };
        registry.restore_schemas()?;
        if let PersistenceMode::File(path) = &mode {
            info!(path = %path.display(), tables = registry.schemas.len(), "opened database");
        }
        Ok(registry)
    }

    /// File name of the database, `:memory:` when in memory.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn connection(&self) -> &Connection {
        &self.db
    }
    pub fn schemas(&self) -> &[RecordSchema] {
        &self.schemas
    }
    pub fn schema(&self, table: &str) -> Option<&RecordSchema> {
        self.schemas.iter().find(|s| s.table() == table)
    }
    pub fn store(&self, table: &str) -> Result<RecordStore<'_>> {
        self.schema(table)
            .map(|schema| RecordStore::new(&self.db, schema))
            .ok_or_else(|| YankError::UnknownTable(table.to_string()))
    }

    /// Creates the table of the schema and records its field metadata,
    /// replacing an earlier registration under the same table name.
    pub fn register(&mut self, schema: RecordSchema) -> Result<()> {
        RecordStore::new(&self.db, &schema).create_table()?;
        let tx = self.db.transaction()?;
        tx.execute("delete from yank_field where table_name = ?", params![schema.table()])?;
        tx.execute("delete from yank_display where table_name = ?", params![schema.table()])?;
        {
            let mut add_field = tx.prepare(
                "
                insert into yank_field (
                    table_name,
                    position,
                    field,
                    cast_type,
                    display,
                    nullable,
                    is_unique,
                    weight
                ) values (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for (position, field) in schema.columns().enumerate() {
                add_field.execute(params![
                    schema.table(),
                    position as i64,
                    &field.name,
                    field.cast.to_string(),
                    &field.display,
                    field.nullable,
                    field.unique,
                    field.weight
                ])?;
            }
            let mut add_display = tx.prepare(
                "
                insert into yank_display (
                    table_name,
                    view,
                    position,
                    field,
                    label
                ) values (?, ?, ?, ?, ?)
                ",
            )?;
            for (position, shown) in schema.list_display().iter().enumerate() {
                add_display.execute(params![schema.table(), LIST_VIEW, position as i64, &shown.field, &shown.label])?;
            }
            for (position, shown) in schema.detail_display().iter().flatten().enumerate() {
                add_display.execute(params![schema.table(), DETAIL_VIEW, position as i64, &shown.field, &shown.label])?;
            }
        }
        tx.commit()?;
        info!(
            table = schema.table(),
            fields = schema.fields().len(),
            "registered schema"
        );
        self.schemas.retain(|s| s.table() != schema.table());
        self.schemas.push(schema);
        Ok(())
    }

    fn restore_schemas(&mut self) -> Result<()> {
        let mut tables: Vec<(String, Vec<(String, FieldOptions)>)> = Vec::new();
        {
            let mut all_fields = self.db.prepare(
                "
                select table_name, field, cast_type, display, nullable, is_unique, weight
                    from yank_field
                    order by table_name, position
                ",
            )?;
            let mut rows = all_fields.query([])?;
            while let Some(row) = rows.next()? {
                let table: String = row.get(0)?;
                let field: String = row.get(1)?;
                let cast: String = row.get(2)?;
                let cast: CastType = match cast.parse() {
                    Ok(cast) => cast,
                    Err(e) => {
                        warn!(table = %table, field = %field, error = %e, "skipping stored field");
                        continue;
                    }
                };
                let mut options = FieldOptions::new(cast).display(row.get::<_, String>(3)?);
                options.null = row.get(4)?;
                options.unique = row.get(5)?;
                options.weight = row.get(6)?;
                match tables.iter_mut().find(|(t, _)| *t == table) {
                    Some((_, fields)) => fields.push((field, options)),
                    None => tables.push((table, vec![(field, options)])),
                }
            }
        }
        let mut displays: HashMap<(String, String), Vec<(String, Option<String>)>> = HashMap::new();
        {
            let mut all_displays = self.db.prepare(
                "
                select table_name, view, field, label
                    from yank_display
                    order by table_name, view, position
                ",
            )?;
            let mut rows = all_displays.query([])?;
            while let Some(row) = rows.next()? {
                displays
                    .entry((row.get(0)?, row.get(1)?))
                    .or_default()
                    .push((row.get(2)?, Some(row.get(3)?)));
            }
        }
        for (table, fields) in tables {
            let mut builder = SchemaBuilder::new(table.clone()).fields(fields);
            if let Some(list) = displays.remove(&(table.clone(), LIST_VIEW.to_string())) {
                builder = builder.display_list_by(list);
            }
            if let Some(detail) = displays.remove(&(table.clone(), DETAIL_VIEW.to_string())) {
                builder = builder.display_detail_by(detail);
            }
            match builder.build() {
                Ok(schema) => {
                    debug!(table = %table, "restored schema");
                    self.schemas.push(schema);
                }
                Err(e) => warn!(table = %table, error = %e, "could not restore schema"),
            }
        }
        Ok(())
    }
}

/// `text REGEXP pattern`, backed by the regex crate.
fn add_regexp_function(db: &Connection) -> std::result::Result<(), StorageError> {
    db.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let is_match = match ctx.get_raw(1) {
                ValueRef::Text(text) => std::str::from_utf8(text)
                    .map(|t| pattern.is_match(t))
                    .unwrap_or(false),
                _ => false,
            };
            Ok(is_match)
        },
    )?;
    Ok(())
}

/// Replaces the builtin `lower`, which only folds ASCII letters.
fn add_lower_function(db: &Connection) -> std::result::Result<(), StorageError> {
    db.create_scalar_function(
        "lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Text(text) => SqlValue::Text(String::from_utf8_lossy(text).to_lowercase()),
                ValueRef::Integer(i) => SqlValue::Text(i.to_string()),
                ValueRef::Real(f) => SqlValue::Text(f.to_string()),
                ValueRef::Blob(blob) => SqlValue::Blob(blob.to_vec()),
            })
        },
    )?;
    Ok(())
}
