//! Filter compilation for SQL WHERE clauses
//!
//! Turns a caller-built `Filters` map into parameterized predicates:
//!
//! - array value: `col = ANY(CAST($n AS "_type"))`, or `&&` on array columns
//! - string containing `%`: `col::text ILIKE $n`
//! - anything else: `col = CAST($n AS "type")`
//!
//! `null` and empty-string values mean "no filter" and are skipped. Keys can
//! only be `&'static str`, so column names come from code; they are still
//! checked against the live schema before use.

use serde_json::Value;

use crate::error::Result;
use crate::sql::params::{Params, SqlParam};
use crate::sql::shape::ColumnScope;

/// Marker that turns an equality filter into a partial match
pub const WILDCARD: char = '%';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    ILike,
    AnyOf,
}

/// One effective filter after empty values were dropped
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub column: &'static str,
    pub operator: FilterOperator,
    pub value: Value,
}

/// Ordered key/value filter map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    entries: Vec<(&'static str, Value)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a filter; replacing keeps the original position
    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }

    /// Add a filter only when a value is present
    pub fn with_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(column, v),
            None => self,
        }
    }

    pub fn set(&mut self, column: &'static str, value: Value) {
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effective filters in insertion order
    pub fn specs(&self) -> Vec<FilterSpec> {
        self.entries
            .iter()
            .filter(|(_, value)| !is_blank(value))
            .map(|(column, value)| FilterSpec {
                column: *column,
                operator: operator_for(value),
                value: value.clone(),
            })
            .collect()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn operator_for(value: &Value) -> FilterOperator {
    match value {
        Value::Array(_) => FilterOperator::AnyOf,
        Value::String(s) if s.contains(WILDCARD) => FilterOperator::ILike,
        _ => FilterOperator::Eq,
    }
}

/// Compile filters into WHERE predicates, pushing values onto `params`
///
/// Fails with `UnknownColumn` when a key is not in scope; a filter that
/// silently vanished would widen the result set.
pub fn compile_filters(
    filters: &Filters,
    scope: &ColumnScope<'_>,
    params: &mut Params,
) -> Result<Vec<String>> {
    let mut clauses = Vec::new();

    for spec in filters.specs() {
        let column = scope.resolve(spec.column)?;
        let target = column.sql();

        let clause = match spec.operator {
            FilterOperator::AnyOf => {
                let placeholder = params.push(SqlParam::from_json(&spec.value));
                if column.info.is_array() {
                    format!("{} && CAST({} AS {})", target, placeholder, column.info.cast_type())
                } else {
                    format!(
                        "{} = ANY(CAST({} AS {}))",
                        target,
                        placeholder,
                        column.info.array_cast_type()
                    )
                }
            }
            FilterOperator::ILike => {
                let placeholder = params.push(SqlParam::from_json(&spec.value));
                format!("{}::text ILIKE {}", target, placeholder)
            }
            FilterOperator::Eq if column.info.is_json() => {
                let placeholder = params.push(SqlParam::Text(spec.value.to_string()));
                format!("{}::jsonb = CAST({} AS \"jsonb\")", target, placeholder)
            }
            FilterOperator::Eq => {
                let placeholder = params.push(SqlParam::from_json(&spec.value));
                format!("{} = CAST({} AS {})", target, placeholder, column.info.cast_type())
            }
        };
        clauses.push(clause);
    }

    Ok(clauses)
}
