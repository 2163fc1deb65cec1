//! Soft-delete policy
//!
//! A table takes part in soft deletion exactly when it has a `deleted_at`
//! column. The policy turns that fact into a WHERE fragment that callers can
//! AND in unconditionally.

use crate::catalog::TableDescriptor;
use crate::error::{RepositoryError, Result};
use crate::sql::sanitize::quote_qualified;

pub const DELETED_AT: &str = "deleted_at";

/// Tautology used when the table has no soft-delete column
pub const ALWAYS_VISIBLE: &str = "1=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDeletePolicy {
    enabled: bool,
}

impl SoftDeletePolicy {
    pub fn for_table(table: &TableDescriptor) -> Self {
        Self {
            enabled: table.has_column(DELETED_AT),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `"alias"."deleted_at" IS NULL`, or `1=1` without soft deletion
    pub fn not_deleted_clause(&self, alias: &str) -> String {
        if self.enabled {
            format!("{} IS NULL", quote_qualified(alias, DELETED_AT))
        } else {
            ALWAYS_VISIBLE.to_string()
        }
    }

    /// `"alias"."deleted_at" IS NOT NULL`, used by restore
    pub(crate) fn deleted_clause(&self, alias: &str) -> String {
        format!("{} IS NOT NULL", quote_qualified(alias, DELETED_AT))
    }

    /// Fail with a capability error when the table cannot soft delete
    pub fn require(&self, table: &str, operation: &'static str) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(RepositoryError::capability(table, operation, DELETED_AT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_with_deleted_at() {
        let table = TableDescriptor::with_columns("clientes", &["id", "deleted_at"]);
        let policy = SoftDeletePolicy::for_table(&table);
        assert!(policy.is_enabled());
        assert_eq!(policy.not_deleted_clause("c"), "\"c\".\"deleted_at\" IS NULL");
    }

    #[test]
    fn test_tautology_without_deleted_at() {
        let table = TableDescriptor::with_columns("motoristas", &["id", "nome"]);
        let policy = SoftDeletePolicy::for_table(&table);
        assert!(!policy.is_enabled());
        assert_eq!(policy.not_deleted_clause("m"), "1=1");
    }

    #[test]
    fn test_require_reports_capability() {
        let table = TableDescriptor::with_columns("motoristas", &["id"]);
        let err = SoftDeletePolicy::for_table(&table)
            .require("motoristas", "soft delete")
            .unwrap_err();
        match err {
            RepositoryError::SchemaCapability { table, column, .. } => {
                assert_eq!(table, "motoristas");
                assert_eq!(column, "deleted_at");
            }
            other => panic!("Expected SchemaCapability, got {other:?}"),
        }
    }
}
