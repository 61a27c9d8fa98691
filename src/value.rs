//! Value tree validated by the engine.
//!
//! `Value` mirrors what a form holds on the JavaScript side: it keeps
//! `undefined` and `null` apart (required/defined/notnull depend on the
//! difference), and carries dates and file handles as first-class leaves.
//!
//! # Example
//!
//! ```
//! use formguard::value::Value;
//! use formguard::path::Path;
//! use serde_json::json;
//!
//! let state = Value::from(json!({ "user": { "tags": ["a", "b"] } }));
//! let path = Path::parse("user.tags[1]").unwrap();
//! assert_eq!(state.get_path(&path), Some(&Value::from("b")));
//! assert!(state.get("missing").is_none());
//! ```

use crate::path::{Path, Segment};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;

/// Shared `undefined`, handed out for missing fields and out-of-range
/// indices so that child contexts can borrow a value that always exists.
pub static UNDEFINED: Value = Value::Undefined;

/// Metadata of a selected file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: None,
        }
    }
}

/// A node of the value tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value (missing field, unset variable).
    #[default]
    Undefined,
    Null,
    Bool(bool),
    /// IEEE 754 double, like a JavaScript number. `NaN` is not a valid number.
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    File(FileInfo),
    Array(Vec<Value>),
    /// Object with insertion-ordered keys.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Build an object from `(key, value)` pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Field of an object. `None` for missing keys and non-objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Child addressed by one segment: object key or array index.
    pub fn get_segment(&self, segment: &Segment) -> Option<&Value> {
        match (self, segment) {
            (Value::Object(map), Segment::Key(key)) => map.get(key),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Resolve a path from this value. `None` if any step is missing.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        path.iter()
            .try_fold(self, |current, segment| current.get_segment(segment))
    }

    /// Name of the runtime type, as used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::File(_) => "file",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(date: NaiveDateTime) -> Self {
        Value::Date(date)
    }
}

impl From<FileInfo> for Value {
    fn from(file: FileInfo) -> Self {
        Value::File(file)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}
