//! Record, cursor and page types flowing through the pipeline

use serde_json::{Map, Value};

/// A single document payload: field name → JSON value.
///
/// Schema is not fixed; callers look fields up by name at the boundary.
/// Records are immutable once produced by a [`PageSource`](crate::PageSource).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a record from a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Render a field as plain text.
    ///
    /// Strings are unquoted, `null` is empty, arrays/objects are compact JSON.
    /// Returns `None` if the field is absent.
    pub fn field_text(&self, field: &str) -> Option<String> {
        self.0.get(field).map(render_value)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Opaque continuation token handed back to the source unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor(Option<String>);

impl Cursor {
    /// The empty cursor used for the first `next` call of a run
    pub fn initial() -> Self {
        Self(None)
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_none()
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// One page of results: records in source order plus the cursor for the next call.
///
/// `exhausted` marks the final page; its records are still delivered but the
/// source is not queried again.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub cursor: Cursor,
    pub exhausted: bool,
}

impl Page {
    pub fn new(records: Vec<Record>, cursor: Cursor) -> Self {
        Self {
            records,
            cursor,
            exhausted: false,
        }
    }

    /// Mark this page as the last one
    pub fn last(mut self) -> Self {
        self.exhausted = true;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
