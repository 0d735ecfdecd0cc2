//! Named-parameter substitution.
//!
//! `:name` tokens in SQL text are replaced with escaped literals taken from a
//! [`NamedParams`] map. Escaping follows the literal rules of the target
//! backend. Nothing here touches the network.

use crate::models::{DatabaseType, NamedParams, ParamBinding, SqlValue};
use regex::{Captures, Regex};
use std::fmt::Write as _;
use std::sync::LazyLock;

/// `:` followed by ASCII word characters.
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z0-9_]+)").expect("token pattern is valid"));

/// Replace every `:name` token whose name is a key of `values`.
///
/// Unknown tokens are left verbatim. With no values at all the SQL is
/// returned unchanged.
pub fn query_format(sql: &str, values: Option<&NamedParams>, db_type: DatabaseType) -> String {
    let Some(values) = values.filter(|v| !v.is_empty()) else {
        return sql.to_string();
    };

    TOKEN_PATTERN
        .replace_all(sql, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => escape_literal(value, db_type),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Build `:prefix0 … :prefix{N-1}` tokens and their values, in input order.
pub fn paramify<I, T>(list: I, prefix: &str) -> ParamBinding
where
    I: IntoIterator<Item = T>,
    T: Into<SqlValue>,
{
    let mut binding = ParamBinding::default();
    for (idx, item) in list.into_iter().enumerate() {
        let key = format!("{prefix}{idx}");
        binding.tokens.push(format!(":{key}"));
        binding.values.insert(key, item.into());
    }
    binding
}

/// Render a value as a SQL literal for the given backend.
pub fn escape_literal(value: &SqlValue, db_type: DatabaseType) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => match db_type {
            DatabaseType::MySQL => b.to_string(),
            DatabaseType::PostgreSQL => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            DatabaseType::SQLite => (if *b { "1" } else { "0" }).to_string(),
        },
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) if f.is_finite() => f.to_string(),
        // NaN and infinities have no numeric literal
        SqlValue::Float(f) => escape_string(&f.to_string(), db_type),
        SqlValue::String(s) => escape_string(s, db_type),
        SqlValue::Bytes(bytes) => escape_bytes(bytes, db_type),
        SqlValue::Json(json) => escape_string(&json.to_string(), db_type),
    }
}

fn escape_string(s: &str, db_type: DatabaseType) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    match db_type {
        DatabaseType::MySQL => {
            for c in s.chars() {
                match c {
                    '\0' => out.push_str("\\0"),
                    '\u{8}' => out.push_str("\\b"),
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\u{1a}' => out.push_str("\\Z"),
                    '"' => out.push_str("\\\""),
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    _ => out.push(c),
                }
            }
        }
        DatabaseType::PostgreSQL | DatabaseType::SQLite => {
            for c in s.chars() {
                if c == '\'' {
                    out.push('\'');
                }
                out.push(c);
            }
        }
    }
    out.push('\'');
    out
}

fn escape_bytes(bytes: &[u8], db_type: DatabaseType) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{b:02X}");
    }
    match db_type {
        DatabaseType::MySQL | DatabaseType::SQLite => format!("X'{hex}'"),
        DatabaseType::PostgreSQL => format!("'\\x{hex}'::bytea"),
    }
}
