//! INSERT, UPDATE and DELETE statements
//!
//! Every statement addresses rows by primary key, casts bound text to the live
//! column type and returns what changed. Soft-delete visibility is part of the
//! WHERE clause of everything except `purge`.

use serde_json::Value;

use crate::catalog::{ColumnInfo, TableDescriptor};
use crate::error::{RepositoryError, Result};
use crate::row::Row;
use crate::soft_delete::{DELETED_AT, SoftDeletePolicy};
use crate::sql::params::{Params, SqlParam};
use crate::sql::sanitize::{quote_identifier, quote_qualified};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// A statement and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatement {
    pub sql: String,
    pub params: Params,
}

/// Target of a write: table, alias, primary key and soft-delete policy
#[derive(Debug, Clone, Copy)]
pub struct WriteTarget<'a> {
    pub table: &'a TableDescriptor,
    pub alias: &'a str,
    pub primary_key: &'a str,
    pub soft_delete: SoftDeletePolicy,
}

impl<'a> WriteTarget<'a> {
    pub fn new(table: &'a TableDescriptor, alias: &'a str, primary_key: &'a str) -> Self {
        Self {
            table,
            alias,
            primary_key,
            soft_delete: SoftDeletePolicy::for_table(table),
        }
    }

    fn primary_key_column(&self, operation: &'static str) -> Result<&'a ColumnInfo> {
        self.table.column(self.primary_key).ok_or_else(|| {
            RepositoryError::capability(self.table.name(), operation, self.primary_key)
        })
    }

    /// `"t" AS "a"`
    fn target_sql(&self) -> String {
        format!("{} AS {}", self.table.quoted(), quote_identifier(self.alias))
    }

    /// `"a"."pk" = CAST($n AS "udt")`
    fn id_clause(
        &self,
        id: &Value,
        params: &mut Params,
        operation: &'static str,
    ) -> Result<String> {
        let pk = self.primary_key_column(operation)?;
        if id.is_null() {
            return Err(RepositoryError::validation(format!(
                "{} requires a non-null '{}'",
                operation, self.primary_key
            )));
        }
        let placeholder = bind_column_value(params, pk, id);
        Ok(format!(
            "{} = {}",
            quote_qualified(self.alias, &pk.name),
            placeholder
        ))
    }

    fn returning_id(&self) -> String {
        format!("RETURNING {}", quote_qualified(self.alias, self.primary_key))
    }
}

/// Push a value for `column` and return its cast placeholder
///
/// JSON columns receive the JSON text of the value, array columns a text
/// array, everything else the value's text form. SQL NULL stays NULL.
pub(crate) fn bind_column_value(params: &mut Params, column: &ColumnInfo, value: &Value) -> String {
    let param = match value {
        Value::Null => SqlParam::Null,
        v if column.is_json() => SqlParam::Text(v.to_string()),
        v => SqlParam::from_json(v),
    };
    let placeholder = params.push(param);
    format!("CAST({} AS {})", placeholder, column.cast_type())
}

fn is_timestamp_column(name: &str) -> bool {
    name == CREATED_AT || name == UPDATED_AT
}

/// `INSERT ... RETURNING *`
///
/// `created_at`/`updated_at` are stamped with `NOW()` when the table has them,
/// replacing whatever the caller supplied.
pub fn build_insert(table: &TableDescriptor, data: &Row) -> Result<WriteStatement> {
    let mut params = Params::new();
    let mut columns = Vec::new();
    let mut values = Vec::new();

    for (key, value) in data {
        if is_timestamp_column(key) && table.has_column(key) {
            continue;
        }
        let column = table
            .column(key)
            .ok_or_else(|| RepositoryError::unknown_column(table.name(), key))?;
        columns.push(quote_identifier(&column.name));
        values.push(bind_column_value(&mut params, column, value));
    }

    for stamp in [CREATED_AT, UPDATED_AT] {
        if table.has_column(stamp) {
            columns.push(quote_identifier(stamp));
            values.push("NOW()".to_string());
        }
    }

    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table.quoted())
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table.quoted(),
            columns.join(", "),
            values.join(", ")
        )
    };

    Ok(WriteStatement { sql, params })
}

/// `UPDATE ... SET <supplied keys> WHERE pk AND not deleted RETURNING *`
///
/// Returns `None` when `data` has nothing to set. The primary key and
/// `deleted_at` cannot be changed here.
pub fn build_update(
    target: WriteTarget<'_>,
    id: &Value,
    data: &Row,
) -> Result<Option<WriteStatement>> {
    let table = target.table;
    let mut params = Params::new();
    let id_clause = target.id_clause(id, &mut params, "update")?;

    let mut sets = Vec::new();
    for (key, value) in data {
        if key == target.primary_key {
            return Err(RepositoryError::validation(format!(
                "Primary key '{}' cannot be updated",
                key
            )));
        }
        if key == DELETED_AT {
            return Err(RepositoryError::validation(
                "'deleted_at' is managed by soft delete and restore",
            ));
        }
        if is_timestamp_column(key) && table.has_column(key) {
            continue;
        }
        let column = table
            .column(key)
            .ok_or_else(|| RepositoryError::unknown_column(table.name(), key))?;
        sets.push(format!(
            "{} = {}",
            quote_identifier(&column.name),
            bind_column_value(&mut params, column, value)
        ));
    }

    if sets.is_empty() {
        return Ok(None);
    }
    if table.has_column(UPDATED_AT) {
        sets.push(format!("{} = NOW()", quote_identifier(UPDATED_AT)));
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} AND {} RETURNING *",
        target.target_sql(),
        sets.join(", "),
        id_clause,
        target.soft_delete.not_deleted_clause(target.alias)
    );
    Ok(Some(WriteStatement { sql, params }))
}

fn stamp_sets(table: &TableDescriptor, deleted_at: &str) -> String {
    let mut sets = vec![format!("{} = {}", quote_identifier(DELETED_AT), deleted_at)];
    if table.has_column(UPDATED_AT) {
        sets.push(format!("{} = NOW()", quote_identifier(UPDATED_AT)));
    }
    sets.join(", ")
}

/// Mark a visible row deleted; a second call matches nothing
pub fn build_soft_delete(target: WriteTarget<'_>, id: &Value) -> Result<WriteStatement> {
    target.soft_delete.require(target.table.name(), "soft delete")?;
    let mut params = Params::new();
    let id_clause = target.id_clause(id, &mut params, "soft delete")?;

    let sql = format!(
        "UPDATE {} SET {} WHERE {} AND {} {}",
        target.target_sql(),
        stamp_sets(target.table, "NOW()"),
        id_clause,
        target.soft_delete.not_deleted_clause(target.alias),
        target.returning_id()
    );
    Ok(WriteStatement { sql, params })
}

/// Clear `deleted_at` on a soft-deleted row
pub fn build_restore(target: WriteTarget<'_>, id: &Value) -> Result<WriteStatement> {
    target.soft_delete.require(target.table.name(), "restore")?;
    let mut params = Params::new();
    let id_clause = target.id_clause(id, &mut params, "restore")?;

    let sql = format!(
        "UPDATE {} SET {} WHERE {} AND {} {}",
        target.target_sql(),
        stamp_sets(target.table, "NULL"),
        id_clause,
        target.soft_delete.deleted_clause(target.alias),
        target.returning_id()
    );
    Ok(WriteStatement { sql, params })
}

/// Hard delete of a row that is still visible
pub fn build_delete(target: WriteTarget<'_>, id: &Value) -> Result<WriteStatement> {
    let mut params = Params::new();
    let id_clause = target.id_clause(id, &mut params, "delete")?;

    let sql = format!(
        "DELETE FROM {} WHERE {} AND {} {}",
        target.target_sql(),
        id_clause,
        target.soft_delete.not_deleted_clause(target.alias),
        target.returning_id()
    );
    Ok(WriteStatement { sql, params })
}

/// Hard delete regardless of soft-delete state
pub fn build_purge(target: WriteTarget<'_>, id: &Value) -> Result<WriteStatement> {
    let mut params = Params::new();
    let id_clause = target.id_clause(id, &mut params, "purge")?;

    let sql = format!(
        "DELETE FROM {} WHERE {} {}",
        target.target_sql(),
        id_clause,
        target.returning_id()
    );
    Ok(WriteStatement { sql, params })
}
