//! Row decoding into JSON.
//!
//! Each backend row type implements [`RowToJson`]. Decoding runs in two
//! steps: the column's declared type name is classified into a
//! [`TypeCategory`], then a backend-specific decoder extracts the value.
//! Values that cannot be decoded become `null` instead of failing the query.

use crate::models::{DatabaseType, Row as JsonRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // checked first: "numeric" would otherwise look like a float
    if lower.contains("decimal") || lower.contains("numeric") {
        return if db == DatabaseType::SQLite {
            TypeCategory::Float
        } else {
            TypeCategory::Decimal
        };
    }

    match lower.as_str() {
        "bool" | "boolean" => TypeCategory::Boolean,
        "json" | "jsonb" => TypeCategory::Json,
        "real" | "float4" | "float8" => TypeCategory::Float,
        "bytea" => TypeCategory::Binary,
        _ if lower.contains("int") || lower.contains("serial") => TypeCategory::Integer,
        _ if lower.contains("float") || lower.contains("double") => TypeCategory::Float,
        _ if lower.contains("blob") || lower.contains("binary") => TypeCategory::Binary,
        _ => TypeCategory::Text,
    }
}

/// DECIMAL/NUMERIC kept in its exact textual form.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        categorize_type(ty.name(), DatabaseType::MySQL) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        categorize_type(ty.name(), DatabaseType::PostgreSQL) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary column values are reported as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Decode column `idx` as `Option<T>`, flattening NULL and decode errors.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

/// Conversion of a backend row into a JSON object.
pub trait RowToJson {
    /// Column names in result order.
    fn column_names(&self) -> Vec<String>;

    fn to_json_map(&self) -> JsonRow;
}

/// Both methods walk the columns the same way for every backend.
macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decode:path) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_json_map(&self) -> JsonRow {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decode(self, idx, category))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, decode_mysql);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, decode_postgres);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, decode_sqlite);

fn decode_mysql(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    let value = match category {
        TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|d| JsonValue::String(d.0)),
        TypeCategory::Integer => get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from)),
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|b| encode_binary(&b)),
        TypeCategory::Json => get::<_, JsonValue>(row, idx),
        TypeCategory::Text => get::<_, String>(row, idx).map(JsonValue::String),
    };
    value.unwrap_or(JsonValue::Null)
}

fn decode_postgres(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    let value = match category {
        TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|d| JsonValue::String(d.0)),
        TypeCategory::Integer => get::<_, i64>(row, idx)
            .or_else(|| get::<_, i32>(row, idx).map(i64::from))
            .or_else(|| get::<_, i16>(row, idx).map(i64::from))
            .map(JsonValue::from),
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|b| encode_binary(&b)),
        TypeCategory::Json => get::<_, JsonValue>(row, idx),
        TypeCategory::Text => get::<_, String>(row, idx).map(JsonValue::String),
    };
    value.unwrap_or(JsonValue::Null)
}

fn decode_sqlite(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
    let value = match category {
        TypeCategory::Integer => get::<_, i64>(row, idx).map(JsonValue::from),
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
        TypeCategory::Float | TypeCategory::Decimal => get::<_, f64>(row, idx).map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|b| encode_binary(&b)),
        TypeCategory::Json | TypeCategory::Text => decode_sqlite_dynamic(row, idx),
    };
    value.unwrap_or(JsonValue::Null)
}

/// SQLite columns without a declared type (expressions such as `SELECT 1`)
/// report their storage class, so try the usual classes in turn.
fn decode_sqlite_dynamic(row: &SqliteRow, idx: usize) -> Option<JsonValue> {
    get::<_, String>(row, idx)
        .map(JsonValue::String)
        .or_else(|| get::<_, i64>(row, idx).map(JsonValue::from))
        .or_else(|| get::<_, f64>(row, idx).map(float_value))
        .or_else(|| get::<_, Vec<u8>>(row, idx).map(|b| encode_binary(&b)))
}
