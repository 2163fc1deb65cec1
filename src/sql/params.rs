//! Positional parameters
//!
//! Every value that reaches a statement is pushed here and referenced by its
//! `$n` placeholder. Values travel as text (or text[]) and are cast to the live
//! column type in SQL, which keeps one binding path for every column type.

use serde_json::Value;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Text(String),
    /// `None` elements bind as SQL NULL inside the array
    TextArray(Vec<Option<String>>),
    Int(i64),
}

impl SqlParam {
    /// Convert a JSON value into its text form
    ///
    /// Arrays become text arrays with `null` elements kept as NULL, objects
    /// become their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Array(items) => SqlParam::TextArray(
                items
                    .iter()
                    .map(|v| (!v.is_null()).then(|| json_value_to_string(v)))
                    .collect(),
            ),
            other => SqlParam::Text(json_value_to_string(other)),
        }
    }
}

/// Text form of a JSON scalar as PostgreSQL's input functions expect it
pub fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

/// Ordered parameter list that hands out placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<SqlParam>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its placeholder (`$1`, `$2`, ...)
    pub fn push(&mut self, param: SqlParam) -> String {
        self.values.push(param);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlParam] {
        &self.values
    }
}

/// Bind parameters onto a query in order
pub fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::TextArray(items) => query.bind(items.clone()),
            SqlParam::Int(i) => query.bind(*i),
        };
    }
    query
}
