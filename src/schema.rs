//! Field declarations and the finalized record schema.
//!
//! A collection target declares its fields once, as name and [`FieldSpec`]
//! pairs, each either a bare [`CastType`] or a [`FieldOptions`] descriptor.
//! [`SchemaBuilder::build`] validates the declarations, fills in defaults
//! (display labels, list/detail display groupings) and normalizes rank weights
//! into a [`RecordSchema`], which is what storage, casting, querying and
//! display all work from.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cast;
use crate::datatype::{CastType, Raw, Value};
use crate::error::{CastError, SchemaError};

pub const ID: &str = "id";
pub const URL: &str = "url";
pub const YANKED_AT: &str = "yanked_at";

const DEFAULT_LIST_FIELDS: usize = 5;
const DEFAULT_DETAIL_FIELDS: usize = 10;
const DETAIL_COLUMNS: usize = 2;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

// ------------- Declarations -------------
/// Full form of a field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    pub cast: CastType,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub null: bool,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl FieldOptions {
    pub fn new(cast: CastType) -> Self {
        Self { cast, display: None, unique: false, null: false, weight: None }
    }
    pub fn display(mut self, label: impl Into<String>) -> Self {
        self.display = Some(label.into());
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// A bare type is shorthand for a descriptor carrying only `cast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Bare(CastType),
    Descriptor(FieldOptions),
}

impl FieldSpec {
    fn into_options(self) -> FieldOptions {
        match self {
            FieldSpec::Bare(cast) => FieldOptions::new(cast),
            FieldSpec::Descriptor(options) => options,
        }
    }
}

impl From<CastType> for FieldSpec {
    fn from(cast: CastType) -> Self { FieldSpec::Bare(cast) }
}
impl From<FieldOptions> for FieldSpec {
    fn from(options: FieldOptions) -> Self { FieldSpec::Descriptor(options) }
}

// ------------- Descriptors -------------
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub cast: CastType,
    pub display: String,
    pub nullable: bool,
    pub unique: bool,
    /// Normalized so that the absolute weights of a schema sum to one.
    pub weight: Option<f64>,
}

impl FieldDescriptor {
    fn declared(name: &str, options: FieldOptions) -> Self {
        Self {
            name: name.to_string(),
            cast: options.cast,
            display: options.display.unwrap_or_else(|| title_case(name)),
            nullable: options.null,
            unique: options.unique,
            weight: options.weight,
        }
    }
    fn implicit(name: &str, cast: CastType, display: &str) -> Self {
        Self {
            name: name.to_string(),
            cast,
            display: display.to_string(),
            nullable: false,
            unique: false,
            weight: None,
        }
    }
    pub fn cast(&self, value: impl Into<Raw>) -> Result<Value, CastError> {
        cast::cast(self, value.into())
    }
}

/// A field selected for display, under the label it is shown with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayField {
    pub field: String,
    pub label: String,
}

// ------------- Builder -------------
pub struct SchemaBuilder {
    table: String,
    fields: Vec<(String, FieldSpec)>,
    list_by: Option<Vec<(String, Option<String>)>>,
    detail_by: Option<Vec<(String, Option<String>)>>,
}

impl SchemaBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), fields: Vec::new(), list_by: None, detail_by: None }
    }
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.push((name.into(), spec.into()));
        self
    }
    pub fn fields<N, S>(mut self, fields: impl IntoIterator<Item = (N, S)>) -> Self
    where
        N: Into<String>,
        S: Into<FieldSpec>,
    {
        self.fields.extend(fields.into_iter().map(|(n, s)| (n.into(), s.into())));
        self
    }
    /// Explicit list view fields, optionally with label overrides.
    pub fn display_list_by<N: Into<String>>(mut self, fields: impl IntoIterator<Item = (N, Option<String>)>) -> Self {
        self.list_by = Some(fields.into_iter().map(|(n, l)| (n.into(), l)).collect());
        self
    }
    /// Explicit detail view fields, optionally with label overrides.
    pub fn display_detail_by<N: Into<String>>(mut self, fields: impl IntoIterator<Item = (N, Option<String>)>) -> Self {
        self.detail_by = Some(fields.into_iter().map(|(n, l)| (n.into(), l)).collect());
        self
    }

    pub fn build(self) -> Result<RecordSchema, SchemaError> {
        let table = self.table.trim().to_string();
        if table.is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if !IDENTIFIER.is_match(&table) {
            return Err(SchemaError::InvalidTableName(table));
        }
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut url = FieldDescriptor::implicit(URL, CastType::String, "URL");
        let mut yanked_at = FieldDescriptor::implicit(YANKED_AT, CastType::DateTime, "Yanked At");
        for (name, spec) in self.fields {
            if !IDENTIFIER.is_match(&name) {
                return Err(SchemaError::InvalidFieldName(name));
            }
            if name == ID {
                return Err(SchemaError::ReservedField);
            }
            let options = spec.into_options();
            // the implicit fields win, except for a user supplied label
            if name == URL || name == YANKED_AT {
                let target = if name == URL { &mut url } else { &mut yanked_at };
                if let Some(display) = options.display {
                    target.display = display;
                }
                continue;
            }
            if fields.iter().any(|f| f.name == name) {
                return Err(SchemaError::DuplicateField(name));
            }
            if let Some(weight) = options.weight {
                if weight == 0.0 || !weight.is_finite() {
                    return Err(SchemaError::InvalidWeight { field: name, weight });
                }
            }
            fields.push(FieldDescriptor::declared(&name, options));
        }
        normalize_weights(&mut fields);

        let mut schema = RecordSchema {
            table,
            fields,
            id: FieldDescriptor::implicit(ID, CastType::Integer, "ID"),
            url,
            yanked_at,
            list_display: Vec::new(),
            detail_display: Vec::new(),
            labels: HashMap::new(),
        };
        let declared_labels: Vec<(String, String)> = schema
            .all_fields()
            .map(|f| (f.display.to_lowercase(), f.name.clone()))
            .collect();
        for (label, name) in declared_labels {
            schema.labels.entry(label).or_insert(name);
        }
        let list_display = match &self.list_by {
            Some(selection) => schema.select_display(selection),
            None => schema
                .fields
                .iter()
                .take(DEFAULT_LIST_FIELDS)
                .map(|f| DisplayField { field: f.name.clone(), label: f.display.clone() })
                .collect(),
        };
        let detail_fields: Vec<DisplayField> = match &self.detail_by {
            Some(selection) => schema
                .select_display(selection)
                .into_iter()
                .filter(|d| d.field != URL && d.field != YANKED_AT)
                .collect(),
            None => schema
                .fields
                .iter()
                .take(DEFAULT_DETAIL_FIELDS)
                .map(|f| DisplayField { field: f.name.clone(), label: f.display.clone() })
                .collect(),
        };
        let mut detail_display: Vec<Vec<DisplayField>> =
            detail_fields.chunks(DETAIL_COLUMNS).map(|row| row.to_vec()).collect();
        detail_display.push(vec![
            DisplayField { field: URL.to_string(), label: schema.url.display.clone() },
            DisplayField { field: YANKED_AT.to_string(), label: schema.yanked_at.display.clone() },
        ]);
        for shown in list_display.iter().chain(detail_display.iter().flatten()) {
            schema.labels.entry(shown.label.to_lowercase()).or_insert_with(|| shown.field.clone());
        }
        schema.list_display = list_display;
        schema.detail_display = detail_display;
        Ok(schema)
    }
}

// ------------- Schema -------------
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    table: String,
    fields: Vec<FieldDescriptor>,
    id: FieldDescriptor,
    url: FieldDescriptor,
    yanked_at: FieldDescriptor,
    list_display: Vec<DisplayField>,
    detail_display: Vec<Vec<DisplayField>>,
    // lower-cased display label -> field name
    labels: HashMap<String, String>,
}

impl RecordSchema {
    pub fn builder(table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(table)
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
    /// Every stored column except the primary key: declared fields, then `url` and `yanked_at`.
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().chain([&self.url, &self.yanked_at])
    }
    /// `id` followed by every stored column.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        std::iter::once(&self.id).chain(self.columns())
    }
    pub fn list_display(&self) -> &[DisplayField] {
        &self.list_display
    }
    pub fn detail_display(&self) -> &[Vec<DisplayField>] {
        &self.detail_display
    }
    pub fn weighted_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.weight.is_some())
    }
    /// Exact lookup by field name, implicit fields included.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.all_fields().find(|f| f.name == name)
    }
    /// Lookup by field name, falling back to a case-insensitive display label.
    pub fn resolve(&self, token: &str) -> Option<&FieldDescriptor> {
        let token = token.trim();
        self.field(token).or_else(|| {
            self.labels
                .get(&token.to_lowercase())
                .and_then(|name| self.field(name))
        })
    }
    /// Casts a value against the named field.
    pub fn cast(&self, name: &str, value: impl Into<Raw>) -> Option<Result<Value, CastError>> {
        self.field(name).map(|f| f.cast(value))
    }
    fn select_display(&self, selection: &[(String, Option<String>)]) -> Vec<DisplayField> {
        selection
            .iter()
            .filter_map(|(name, label)| {
                self.resolve(name).map(|f| DisplayField {
                    field: f.name.clone(),
                    label: label.clone().unwrap_or_else(|| f.display.clone()),
                })
            })
            .collect()
    }
}

// ------------- Helpers -------------
/// `item_price` becomes `Item Price`.
pub fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Rescales weights so that their absolute values sum to one, keeping signs.
pub fn normalize_weights(fields: &mut [FieldDescriptor]) {
    let total: f64 = fields.iter().filter_map(|f| f.weight).map(f64::abs).sum();
    if total == 0.0 {
        return;
    }
    for field in fields.iter_mut() {
        if let Some(weight) = field.weight {
            field.weight = Some(weight.signum() * weight.abs() / total);
        }
    }
}

/// Table name for a collection method: `yank_Products` becomes `products`.
pub fn table_name_for(method: &str) -> String {
    let name = method.strip_prefix("yank_").unwrap_or(method);
    name.to_lowercase().replace(' ', "")
}
