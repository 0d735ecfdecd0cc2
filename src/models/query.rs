//! Query-related data models.
//!
//! This module defines parameter values, named-parameter bindings and the
//! row sets returned by query execution.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A decoded row: column name to JSON value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Named parameters for `:name` substitution.
pub type NamedParams = HashMap<String, SqlValue>;

/// A literal value substituted into SQL text.
///
/// Deserialization goes through [`From<JsonValue>`], so binary data is
/// written as `{"base64": "..."}` in both directions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data, `{"base64": "..."}` in JSON
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    /// Arrays and objects, written as JSON text
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        JsonValue::deserialize(deserializer).map(Self::from)
    }
}

/// Scalars map onto their own variants, `{"base64": "..."}` onto bytes;
/// other arrays and objects stay JSON.
impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            JsonValue::Object(map) => match base64_bytes::decode_tagged(&map) {
                Some(bytes) => Self::Bytes(bytes),
                None => Self::Json(JsonValue::Object(map)),
            },
            other => Self::Json(other),
        }
    }
}

/// Binary data as a single-key `{"base64": "..."}` object.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::Serializer;
    use serde::ser::SerializeMap;
    use serde_json::{Map, Value};

    const KEY: &str = "base64";

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(KEY, &STANDARD.encode(bytes))?;
        map.end()
    }

    /// Bytes of a tagged object, or `None` for any other object.
    pub fn decode_tagged(map: &Map<String, Value>) -> Option<Vec<u8>> {
        if map.len() != 1 {
            return None;
        }
        let text = map.get(KEY)?.as_str()?;
        STANDARD.decode(text).ok()
    }
}

/// Placeholder tokens plus the values they stand for, built by `paramify`.
///
/// `tokens[i]` is `":" + key` for the i-th input item, so joining the tokens
/// with `,` yields a ready-made `IN (...)` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamBinding {
    pub values: NamedParams,
    pub tokens: Vec<String>,
}

impl ParamBinding {
    /// Number of bound items.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens joined with commas, for use inside `IN (...)`.
    pub fn placeholder_list(&self) -> String {
        self.tokens.join(",")
    }
}

/// Output of one SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
}

/// Output of one query call: one entry per executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub statements: Vec<StatementResult>,
    pub execution_time_ms: u64,
}

impl RowSet {
    /// Create a row set from per-statement results.
    pub fn new(statements: Vec<StatementResult>, execution_time_ms: u64) -> Self {
        Self {
            statements,
            execution_time_ms,
        }
    }

    /// Rows of the first statement.
    pub fn rows(&self) -> &[Row] {
        self.statements
            .first()
            .map(|s| s.rows.as_slice())
            .unwrap_or(&[])
    }

    /// Take the rows of the first statement.
    pub fn into_rows(self) -> Vec<Row> {
        self.statements
            .into_iter()
            .next()
            .map(|s| s.rows)
            .unwrap_or_default()
    }

    /// Per-statement results in execution order.
    pub fn statements(&self) -> &[StatementResult] {
        &self.statements
    }

    /// Rows affected across all statements.
    pub fn rows_affected(&self) -> u64 {
        self.statements.iter().map(|s| s.rows_affected).sum()
    }
}
