//! Decoding of dynamic rows into JSON maps
//!
//! Tables are only known at runtime, so rows are decoded column by column from
//! the type PostgreSQL reports. Unknown types fall back to their text form.

use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as _, TypeInfo};

/// A decoded row keyed by column name
pub type Row = Map<String, Value>;

/// Decode every column of `row`
pub fn decode_row(row: &PgRow) -> Row {
    let mut out = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name());
        out.insert(column.name().to_string(), value);
    }
    out
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(index).ok().flatten()
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, index).map(Value::Bool),
        "INT2" => get::<i16>(row, index).map(|v| Value::Number(v.into())),
        "INT4" => get::<i32>(row, index).map(|v| Value::Number(v.into())),
        "INT8" => get::<i64>(row, index).map(|v| Value::Number(v.into())),
        "FLOAT4" => get::<f32>(row, index)
            .and_then(|v| Number::from_f64(v as f64))
            .map(Value::Number),
        "FLOAT8" => get::<f64>(row, index)
            .and_then(Number::from_f64)
            .map(Value::Number),
        "NUMERIC" => get::<rust_decimal::Decimal>(row, index)
            .and_then(|d| d.to_f64())
            .and_then(Number::from_f64)
            .map(Value::Number),
        "UUID" => get::<uuid::Uuid>(row, index).map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => get::<Value>(row, index),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index)
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, index).map(|v| Value::String(v.to_string())),
        "TIME" => get::<chrono::NaiveTime>(row, index).map(|v| Value::String(v.to_string())),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" => {
            get::<Vec<Option<String>>>(row, index).map(array_value)
        }
        "INT4[]" => get::<Vec<Option<i32>>>(row, index).map(array_value),
        "INT8[]" => get::<Vec<Option<i64>>>(row, index).map(array_value),
        "UUID[]" => get::<Vec<Option<uuid::Uuid>>>(row, index)
            .map(|v| array_value(v.into_iter().map(|u| u.map(|u| u.to_string())).collect())),
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// Array elements in order, SQL NULL elements as JSON null
fn array_value<T: Into<Value>>(items: Vec<Option<T>>) -> Value {
    Value::Array(items.into_iter().map(Value::from).collect())
}
