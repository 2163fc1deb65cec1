//! Error types for repository operations

use thiserror::Error;

/// Errors that can occur during repository operations
///
/// "Not found" is deliberately absent: lookups return `Ok(None)` and the
/// caller decides what that means.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The live table lacks a column the operation depends on
    #[error("Table '{table}' does not support {operation}: missing column '{column}'")]
    SchemaCapability {
        table: String,
        operation: &'static str,
        column: String,
    },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// Driver failure, kept intact so callers can inspect SQLSTATE codes
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn capability(
        table: impl Into<String>,
        operation: &'static str,
        column: impl Into<String>,
    ) -> Self {
        Self::SchemaCapability {
            table: table.into(),
            operation,
            column: column.into(),
        }
    }

    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Returns the SQLSTATE code of an underlying database error, if any
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            Self::Database(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// Whether this is a unique-constraint violation (SQLSTATE 23505)
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate().as_deref() == Some("23505")
    }
}

/// Log a driver failure with its table/operation context and wrap it unchanged.
pub(crate) fn database_failure<'a>(
    table: &'a str,
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> RepositoryError + 'a {
    move |error| {
        tracing::error!(table, operation, error = %error, "database operation failed");
        RepositoryError::Database(error)
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_message() {
        let err = RepositoryError::capability("clientes", "soft delete", "deleted_at");
        assert_eq!(
            err.to_string(),
            "Table 'clientes' does not support soft delete: missing column 'deleted_at'"
        );
    }

    #[test]
    fn test_sqlstate_absent_for_non_database_errors() {
        let err = RepositoryError::validation("bad payload");
        assert!(err.sqlstate().is_none());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_database_failure_wraps_unchanged() {
        let err = database_failure("motoristas", "find_all")(sqlx::Error::RowNotFound);
        assert!(matches!(err, RepositoryError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_database_failure_borrows_table_name() {
        let table = String::from("motoristas");
        let wrap = database_failure(&table, "count");
        let err = wrap(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RepositoryError::Database(sqlx::Error::PoolTimedOut)));
    }
}
