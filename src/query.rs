//! The filter and sort expression language.
//!
//! Filter tokens have the form `[~]field[__modifier] = value` and are chained
//! with `&&`; sort tokens are field names, optionally prefixed with `-` for
//! descending order. Both are forgiving: a token that is malformed, names an
//! unknown field, or carries a literal that does not cast is dropped rather
//! than reported, so that an interactive session never fails on a typo.
//!
//! ```
//! use yank::datatype::CastType;
//! use yank::persist::{PersistenceMode, Registry};
//! use yank::query::{FilterExpression, QueryBuilder, SortExpression};
//! use yank::schema::SchemaBuilder;
//!
//! let mut registry = Registry::new(PersistenceMode::InMemory).unwrap();
//! registry
//!     .register(SchemaBuilder::new("person").field("name", CastType::String).build().unwrap())
//!     .unwrap();
//! let store = registry.store("person").unwrap();
//! for (name, url) in [("Bob", "http://x/1"), ("Ann", "http://x/2")] {
//!     let mut record = store.create([("name", name), ("url", url)]).unwrap();
//!     store.insert(&mut record).unwrap();
//! }
//! let rows = QueryBuilder::new(&store)
//!     .filter(FilterExpression::parse("name__icontains = bo"))
//!     .sort(SortExpression::parse("-name"))
//!     .fetch()
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;
use tracing::debug;

use crate::datatype::{CastType, Raw, Value};
use crate::error::Result;
use crate::persist::{quote, Record, RecordStore, Selection};
use crate::schema::{FieldDescriptor, RecordSchema, ID};

pub const OPERATOR_AND: &str = "&&";
pub const OPERATOR_NOT: &str = "~";
const MODIFIER_SEPARATOR: &str = "__";

lazy_static! {
    static ref SORT_SEPARATOR: Regex = Regex::new(r"[\s,]+|&&").unwrap();
}

#[derive(Parser)]
#[grammar = "query.pest"]
struct FilterParser;

// ------------- Modifiers -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Regex,
    In,
    IIn,
}

impl Modifier {
    pub const ALL: [Modifier; 11] = [
        Modifier::Exact,
        Modifier::IExact,
        Modifier::Contains,
        Modifier::IContains,
        Modifier::StartsWith,
        Modifier::IStartsWith,
        Modifier::EndsWith,
        Modifier::IEndsWith,
        Modifier::Regex,
        Modifier::In,
        Modifier::IIn,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            Modifier::Exact => "exact",
            Modifier::IExact => "iexact",
            Modifier::Contains => "contains",
            Modifier::IContains => "icontains",
            Modifier::StartsWith => "startswith",
            Modifier::IStartsWith => "istartswith",
            Modifier::EndsWith => "endswith",
            Modifier::IEndsWith => "iendswith",
            Modifier::Regex => "regex",
            Modifier::In => "in",
            Modifier::IIn => "iin",
        }
    }
    /// Modifiers that only make sense against string columns.
    pub fn requires_string(&self) -> bool {
        matches!(
            self,
            Modifier::Contains
                | Modifier::IContains
                | Modifier::StartsWith
                | Modifier::IStartsWith
                | Modifier::EndsWith
                | Modifier::IEndsWith
                | Modifier::Regex
        )
    }
}

impl FromStr for Modifier {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Modifier::ALL
            .iter()
            .find(|m| m.name() == s.trim().to_ascii_lowercase())
            .copied()
            .ok_or(())
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Filter Expressions -------------
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm {
    pub field: String,
    pub modifier: Modifier,
    pub value: String,
    pub negate: bool,
}

impl FilterTerm {
    /// Parses one `[~]field[__modifier] = value` token; `None` when malformed.
    pub fn parse(token: &str) -> Option<Self> {
        let mut pairs = match FilterParser::parse(Rule::filter, token) {
            Ok(pairs) => pairs,
            Err(e) => {
                debug!(token, error = %e, "dropping malformed filter token");
                return None;
            }
        };
        let mut negate = false;
        let mut target = "";
        let mut value = "";
        for pair in pairs.next()?.into_inner() {
            match pair.as_rule() {
                Rule::negation => negate = true,
                Rule::target => target = pair.as_str(),
                Rule::value => value = pair.as_str(),
                _ => (),
            }
        }
        Self::from_parts(target, value, negate)
    }

    /// Builds a term from a `[~]field[__modifier]` key and a raw value.
    pub fn from_parts(key: &str, value: &str, negate: bool) -> Option<Self> {
        let mut key = key.trim();
        let mut negate = negate;
        if let Some(rest) = key.strip_prefix(OPERATOR_NOT) {
            negate = true;
            key = rest.trim_start();
        }
        let (field, modifier) = match key.rsplit_once(MODIFIER_SEPARATOR) {
            Some((field, modifier)) => match modifier.parse::<Modifier>() {
                Ok(modifier) => (field.trim(), modifier),
                // not a modifier, so the underscores belong to the field name
                Err(_) => (key, Modifier::Exact),
            },
            None => (key, Modifier::Exact),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            modifier,
            value: value.trim().to_string(),
            negate,
        })
    }
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.negate {
            write!(f, "{}", OPERATOR_NOT)?;
        }
        write!(f, "{}", self.field)?;
        if self.modifier != Modifier::Exact {
            write!(f, "{}{}", MODIFIER_SEPARATOR, self.modifier)?;
        }
        write!(f, " = {}", self.value)
    }
}

/// Conjunction of filter terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    terms: Vec<FilterTerm>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }
    /// Parses `&&`-chained filter tokens, dropping malformed ones.
    pub fn parse(text: &str) -> Self {
        Self {
            terms: text
                .split(OPERATOR_AND)
                .filter(|token| !token.trim().is_empty())
                .filter_map(FilterTerm::parse)
                .collect(),
        }
    }
    /// Key/value form, which can repeat a field (`name__contains` twice, say).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            terms: pairs
                .into_iter()
                .filter_map(|(k, v)| FilterTerm::from_parts(k.as_ref(), v.as_ref(), false))
                .collect(),
        }
    }
    pub fn push(&mut self, term: FilterTerm) {
        self.terms.push(term);
    }
    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", terms.join(&format!(" {} ", OPERATOR_AND)))
    }
}

// ------------- Sort Expressions -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortExpression {
    keys: Vec<SortKey>,
}

impl SortExpression {
    pub fn new() -> Self {
        Self::default()
    }
    /// Whitespace, comma or `&&` separated tokens; `-field` sorts descending.
    pub fn parse(text: &str) -> Self {
        let keys = SORT_SEPARATOR
            .split(text)
            .filter_map(|token| {
                let (field, ascending) = match token.strip_prefix('-') {
                    Some(field) => (field, false),
                    None => (token, true),
                };
                if field.is_empty() {
                    return None;
                }
                Some(SortKey { field: field.to_string(), ascending })
            })
            .collect();
        Self { keys }
    }
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for SortExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("{}{}", if k.ascending { "" } else { "-" }, k.field))
            .collect();
        write!(f, "{}", keys.join(&format!(" {} ", OPERATOR_AND)))
    }
}

// ------------- Query Builder -------------
pub struct QueryBuilder<'s, 'db> {
    store: &'s RecordStore<'db>,
    filter: FilterExpression,
    sort: SortExpression,
    offset: usize,
    limit: Option<usize>,
}

impl<'s, 'db> QueryBuilder<'s, 'db> {
    pub fn new(store: &'s RecordStore<'db>) -> Self {
        Self {
            store,
            filter: FilterExpression::new(),
            sort: SortExpression::new(),
            offset: 0,
            limit: None,
        }
    }
    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }
    pub fn sort(mut self, sort: SortExpression) -> Self {
        self.sort = sort;
        self
    }
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
    /// Unlimited unless set.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
    /// The resolved `where`/`order by`; ties always fall back to insertion order.
    pub fn selection(&self) -> Selection {
        let schema = self.store.schema();
        let mut selection = Selection::new();
        for term in self.filter.terms() {
            if let Some((condition, params)) = compile_term(schema, term) {
                if term.negate {
                    selection.and(format!("not coalesce(({}), 0)", condition), params);
                } else {
                    selection.and(condition, params);
                }
            }
        }
        for key in self.sort.keys() {
            match schema.resolve(&key.field) {
                Some(field) => selection.order.push(format!(
                    "{} {}",
                    quote(&field.name),
                    if key.ascending { "asc" } else { "desc" }
                )),
                None => debug!(field = %key.field, "dropping unknown sort field"),
            }
        }
        selection.order.push(format!("{} asc", quote(ID)));
        selection
    }
    pub fn fetch(&self) -> Result<Vec<Record>> {
        self.store.select(&self.selection(), self.offset, self.limit)
    }
    /// Matching rows, ignoring offset and limit.
    pub fn count(&self) -> Result<usize> {
        self.store.count_where(&self.selection())
    }
}

fn compile_term(schema: &RecordSchema, term: &FilterTerm) -> Option<(String, Vec<Value>)> {
    let Some(field) = schema.resolve(&term.field) else {
        debug!(field = %term.field, "dropping filter on unknown field");
        return None;
    };
    let is_string = field.cast.is_string();
    if term.modifier.requires_string() && !is_string {
        debug!(field = %field.name, modifier = %term.modifier, "dropping string modifier on non-string field");
        return None;
    }
    let column = quote(&field.name);
    let pattern = |prefix: &str, suffix: &str, case_sensitive: bool| {
        if case_sensitive {
            (
                format!("{} glob ?", column),
                vec![Value::String(format!("{}{}{}", prefix, escape_glob(&term.value), suffix))],
            )
        } else {
            (
                format!("lower({}) like lower(?) escape '\\'", column),
                vec![Value::String(format!("{}{}{}", prefix, escape_like(&term.value), suffix))],
            )
        }
    };
    let compiled = match term.modifier {
        Modifier::Exact => equals(&column, cast_literal(field, &term.value)?),
        Modifier::IExact if is_string => (
            format!("lower({}) = lower(?)", column),
            vec![Value::String(term.value.clone())],
        ),
        Modifier::IExact => equals(&column, cast_literal(field, &term.value)?),
        Modifier::Contains => pattern("*", "*", true),
        Modifier::IContains => pattern("%", "%", false),
        Modifier::StartsWith => pattern("", "*", true),
        Modifier::IStartsWith => pattern("", "%", false),
        Modifier::EndsWith => pattern("*", "", true),
        Modifier::IEndsWith => pattern("%", "", false),
        Modifier::Regex => {
            if let Err(e) = Regex::new(&term.value) {
                debug!(pattern = %term.value, error = %e, "dropping invalid regex filter");
                return None;
            }
            (format!("{} regexp ?", column), vec![Value::String(term.value.clone())])
        }
        Modifier::In | Modifier::IIn => {
            let values = term
                .value
                .split(',')
                .map(|v| cast_literal(field, v.trim()))
                .collect::<Option<Vec<Value>>>()?;
            if values.is_empty() {
                return Some(("0".to_string(), Vec::new()));
            }
            let lower = term.modifier == Modifier::IIn && is_string;
            let placeholders = vec![if lower { "lower(?)" } else { "?" }; values.len()].join(", ");
            let column = if lower { format!("lower({})", column) } else { column.clone() };
            (format!("{} in ({})", column, placeholders), values)
        }
    };
    Some(compiled)
}

fn equals(column: &str, value: Value) -> (String, Vec<Value>) {
    if value.is_null() {
        (format!("{} is null", column), Vec::new())
    } else {
        (format!("{} = ?", column), vec![value])
    }
}

/// Casts a filter literal, reading datetimes from their text forms first.
fn cast_literal(field: &FieldDescriptor, text: &str) -> Option<Value> {
    let text = text.trim();
    let raw = if field.nullable && !field.cast.is_string() && matches!(text.to_ascii_lowercase().as_str(), "none" | "null") {
        Raw::Null
    } else if field.cast == CastType::DateTime {
        match parse_datetime(text) {
            Some(dt) => Raw::DateTime(dt),
            None => {
                debug!(field = %field.name, value = text, "dropping filter with unreadable datetime");
                return None;
            }
        }
    } else {
        Raw::Text(text.to_string())
    };
    match field.cast(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "dropping filter with uncastable value");
            None
        }
    }
}

pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
