//! Related-table resolution
//!
//! The same logical relation (a client's delivery addresses, say) lives under
//! different table and column names across deployments. A `RelationSpec`
//! lists the candidates in priority order; resolution picks the first
//! `(table, foreign key)` pair present in the live schema, or nothing.
//!
//! A resolved relation renders as a correlated `json_agg` subquery, so the
//! parent row comes back with its children as a JSON array. Fields whose
//! physical columns are all missing are left out of each element.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{SchemaCatalog, TableDescriptor};
use crate::error::{RepositoryError, Result};
use crate::soft_delete::SoftDeletePolicy;
use crate::sql::fragment::SqlFragment;
use crate::sql::sanitize::{
    quote_identifier, quote_literal, quote_qualified, validate_identifier,
};
use crate::sql::shape::{Join, SelectItem};

/// One output key and the physical columns that may hold it, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldMapping {
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

impl FieldMapping {
    pub const fn new(key: &'static str, columns: &'static [&'static str]) -> Self {
        Self { key, columns }
    }
}

/// Declarative description of a relation that may or may not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationSpec {
    /// Output key of the aggregated array; must be a valid identifier
    pub name: &'static str,
    pub tables: &'static [&'static str],
    pub foreign_keys: &'static [&'static str],
    /// Empty means "every column of the child row"
    pub fields: &'static [FieldMapping],
    /// Candidate ordering columns for the aggregated array, first present wins
    pub order_by: &'static [&'static str],
}

/// What `resolve_relation` found
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    pub table: Arc<TableDescriptor>,
    pub foreign_key: String,
    pub soft_delete: SoftDeletePolicy,
}

impl RelationDescriptor {
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    pub fn soft_delete_clause(&self, alias: &str) -> String {
        self.soft_delete.not_deleted_clause(alias)
    }

    pub fn columns(&self) -> BTreeSet<String> {
        self.table.column_names()
    }

    /// `LEFT JOIN <table> AS alias ON alias.<fk> = parent`
    pub fn join(&self, alias: &str, parent: &str) -> Result<Join> {
        Join::left(self.table.clone(), alias, &self.foreign_key, parent)
    }
}

/// First `(table, fk)` pair present in the live schema, in priority order
///
/// Tables are tried in order; within an existing table, foreign keys are tried
/// in order. Returns `None` when nothing matches.
pub async fn resolve_relation(
    catalog: &SchemaCatalog,
    tables: &[&str],
    foreign_keys: &[&str],
) -> Result<Option<RelationDescriptor>> {
    for table in tables {
        let Some(descriptor) = catalog.describe(table).await? else {
            continue;
        };
        if let Some(fk) = foreign_keys.iter().find(|fk| descriptor.has_column(fk)) {
            tracing::debug!(table, foreign_key = fk, "resolved related table");
            return Ok(Some(RelationDescriptor {
                soft_delete: SoftDeletePolicy::for_table(&descriptor),
                foreign_key: fk.to_string(),
                table: descriptor,
            }));
        }
    }
    tracing::debug!(candidates = ?tables, "no related table matched");
    Ok(None)
}

impl RelationSpec {
    pub async fn resolve(&self, catalog: &SchemaCatalog) -> Result<Option<ResolvedRelation>> {
        validate_identifier(self.name).map_err(RepositoryError::Validation)?;

        let Some(descriptor) = resolve_relation(catalog, self.tables, self.foreign_keys).await?
        else {
            tracing::warn!(
                relation = self.name,
                "relation absent in this schema, using empty arrays"
            );
            return Ok(None);
        };

        let fields = self
            .fields
            .iter()
            .filter_map(|field| {
                field
                    .columns
                    .iter()
                    .find(|c| descriptor.table.has_column(c))
                    .map(|c| (field.key, c.to_string()))
            })
            .collect();

        let order_column = self
            .order_by
            .iter()
            .find(|c| descriptor.table.has_column(c))
            .map(|c| c.to_string());

        Ok(Some(ResolvedRelation {
            name: self.name,
            descriptor,
            fields,
            order_column,
        }))
    }
}

/// A relation bound to physical columns
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    name: &'static str,
    descriptor: RelationDescriptor,
    fields: Vec<(&'static str, String)>,
    order_column: Option<String>,
}

impl ResolvedRelation {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    /// Output keys with the physical column chosen for each
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    fn alias(&self) -> String {
        format!("{}_rel", self.name)
    }

    /// Correlated subquery yielding a JSON array of the children of
    /// `parent_alias.parent_key`; `[]` when there are none
    pub fn aggregate(&self, parent_alias: &str, parent_key: &str) -> SqlFragment {
        let alias = self.alias();
        let element = if self.fields.is_empty() {
            format!("to_json({})", quote_identifier(&alias))
        } else {
            let pairs = self
                .fields
                .iter()
                .map(|(key, column)| {
                    format!("{}, {}", quote_literal(key), quote_qualified(&alias, column))
                })
                .collect::<Vec<_>>();
            format!("json_build_object({})", pairs.join(", "))
        };
        let order = self
            .order_column
            .as_ref()
            .map(|c| format!(" ORDER BY {}", quote_qualified(&alias, c)))
            .unwrap_or_default();

        SqlFragment::composed(format!(
            "(SELECT COALESCE(json_agg({}{}), '[]'::json) FROM {} AS {} WHERE {} = {} AND {})",
            element,
            order,
            self.descriptor.table.quoted(),
            quote_identifier(&alias),
            quote_qualified(&alias, &self.descriptor.foreign_key),
            quote_qualified(parent_alias, parent_key),
            self.descriptor.soft_delete_clause(&alias)
        ))
    }

    /// The aggregate as a SELECT item named after the relation
    pub fn select_item(&self, parent_alias: &str, parent_key: &str) -> SelectItem {
        SelectItem::expr(self.aggregate(parent_alias, parent_key), self.name)
    }
}
