//! Query shape: FROM, JOIN, SELECT, GROUP BY and HAVING
//!
//! Column references are plain names (`nome`) or alias-qualified (`e.cidade`).
//! They are resolved against the live descriptors of the base table and its
//! joins before any SQL is rendered; nothing unresolved is interpolated.

use std::sync::Arc;

use crate::catalog::{ColumnInfo, TableDescriptor};
use crate::error::{RepositoryError, Result};
use crate::soft_delete::SoftDeletePolicy;
use crate::sql::fragment::SqlFragment;
use crate::sql::sanitize::{
    quote_identifier, quote_qualified, split_qualified, validate_identifier,
};

/// A column reference that was found in the live schema
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub alias: &'a str,
    pub info: &'a ColumnInfo,
}

impl ResolvedColumn<'_> {
    pub fn sql(&self) -> String {
        quote_qualified(self.alias, &self.info.name)
    }
}

/// The tables visible to a query, by alias; the first entry is the base table
#[derive(Debug, Clone)]
pub struct ColumnScope<'a> {
    entries: Vec<(&'a str, &'a TableDescriptor)>,
}

impl<'a> ColumnScope<'a> {
    pub fn new(alias: &'a str, table: &'a TableDescriptor) -> Self {
        Self {
            entries: vec![(alias, table)],
        }
    }

    pub fn with_joins(mut self, joins: &'a [Join]) -> Self {
        for join in joins {
            self.entries.push((join.alias.as_str(), join.table.as_ref()));
        }
        self
    }

    pub fn base_alias(&self) -> &'a str {
        self.entries[0].0
    }

    pub fn base(&self) -> &'a TableDescriptor {
        self.entries[0].1
    }

    /// Resolve a reference, or `None` if the alias or column is unknown
    pub fn try_resolve(&self, name: &str) -> Option<ResolvedColumn<'a>> {
        let (alias, column) = split_qualified(name);
        let (alias, table) = match alias {
            None => self.entries[0],
            Some(alias) => *self.entries.iter().find(|(a, _)| *a == alias)?,
        };
        table
            .column(column)
            .map(|info| ResolvedColumn { alias, info })
    }

    /// Resolve a reference or fail with `UnknownColumn`
    pub fn resolve(&self, name: &str) -> Result<ResolvedColumn<'a>> {
        self.try_resolve(name).ok_or_else(|| {
            let (alias, column) = split_qualified(name);
            let table = alias
                .and_then(|a| self.entries.iter().find(|(x, _)| *x == a))
                .map(|(_, t)| t.name().to_string())
                .unwrap_or_else(|| alias.unwrap_or(self.base().name()).to_string());
            RepositoryError::unknown_column(table, column)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// An equi-join on a table whose shape came from the catalog
///
/// The joined table's soft-delete clause goes into the ON condition, so a
/// LEFT JOIN keeps parent rows whose children are all deleted.
#[derive(Debug, Clone)]
pub struct Join {
    kind: JoinKind,
    table: Arc<TableDescriptor>,
    alias: String,
    column: String,
    parent: String,
}

impl Join {
    /// `LEFT JOIN table AS alias ON alias.column = parent`
    pub fn left(
        table: Arc<TableDescriptor>,
        alias: &str,
        column: &str,
        parent: &str,
    ) -> Result<Self> {
        Self::build(JoinKind::Left, table, alias, column, parent)
    }

    /// `INNER JOIN table AS alias ON alias.column = parent`
    pub fn inner(
        table: Arc<TableDescriptor>,
        alias: &str,
        column: &str,
        parent: &str,
    ) -> Result<Self> {
        Self::build(JoinKind::Inner, table, alias, column, parent)
    }

    fn build(
        kind: JoinKind,
        table: Arc<TableDescriptor>,
        alias: &str,
        column: &str,
        parent: &str,
    ) -> Result<Self> {
        validate_identifier(alias).map_err(RepositoryError::Validation)?;
        if !table.has_column(column) {
            return Err(RepositoryError::unknown_column(table.name(), column));
        }
        Ok(Self {
            kind,
            table,
            alias: alias.to_string(),
            column: column.to_string(),
            parent: parent.to_string(),
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    fn render(&self, scope: &ColumnScope<'_>) -> Result<String> {
        let parent = scope.resolve(&self.parent)?;
        let mut on = format!(
            "{} = {}",
            quote_qualified(&self.alias, &self.column),
            parent.sql()
        );
        let policy = SoftDeletePolicy::for_table(&self.table);
        if policy.is_enabled() {
            on.push_str(" AND ");
            on.push_str(&policy.not_deleted_clause(&self.alias));
        }
        Ok(format!(
            "{} {} AS {} ON {}",
            self.kind.keyword(),
            self.table.quoted(),
            quote_identifier(&self.alias),
            on
        ))
    }
}

/// One entry of the SELECT list
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `alias.*`; `None` means the base table
    All(Option<String>),
    Column(String),
    ColumnAs(String, String),
    Expr(SqlFragment, String),
}

impl SelectItem {
    pub fn all() -> Self {
        SelectItem::All(None)
    }

    pub fn all_of(alias: impl Into<String>) -> Self {
        SelectItem::All(Some(alias.into()))
    }

    pub fn column(name: impl Into<String>) -> Self {
        SelectItem::Column(name.into())
    }

    pub fn column_as(name: impl Into<String>, output: impl Into<String>) -> Self {
        SelectItem::ColumnAs(name.into(), output.into())
    }

    pub fn expr(fragment: SqlFragment, output: impl Into<String>) -> Self {
        SelectItem::Expr(fragment, output.into())
    }

    fn render(&self, scope: &ColumnScope<'_>) -> Result<String> {
        match self {
            SelectItem::All(None) => Ok(format!("{}.*", quote_identifier(scope.base_alias()))),
            SelectItem::All(Some(alias)) => {
                if scope.entries.iter().any(|(a, _)| *a == alias.as_str()) {
                    Ok(format!("{}.*", quote_identifier(alias)))
                } else {
                    Err(RepositoryError::validation(format!("Unknown alias '{alias}'")))
                }
            }
            SelectItem::Column(name) => Ok(scope.resolve(name)?.sql()),
            SelectItem::ColumnAs(name, output) => Ok(format!(
                "{} AS {}",
                scope.resolve(name)?.sql(),
                quote_identifier(output)
            )),
            SelectItem::Expr(fragment, output) => {
                Ok(format!("{} AS {}", fragment, quote_identifier(output)))
            }
        }
    }
}

/// Everything about a query except its filters, ordering and paging
#[derive(Debug, Clone, Default)]
pub struct QueryShape {
    pub select: Vec<SelectItem>,
    pub joins: Vec<Join>,
    pub group_by: Vec<String>,
    pub having: Option<SqlFragment>,
}

impl QueryShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, item: SelectItem) -> Self {
        self.select.push(item);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn having(mut self, fragment: SqlFragment) -> Self {
        self.having = Some(fragment);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.having.is_some()
    }

    /// Joins can repeat base rows
    pub fn fans_out(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn scope<'a>(
        &'a self,
        alias: &'a str,
        table: &'a TableDescriptor,
    ) -> Result<ColumnScope<'a>> {
        for (i, join) in self.joins.iter().enumerate() {
            if join.alias == alias || self.joins[..i].iter().any(|j| j.alias == join.alias) {
                return Err(RepositoryError::validation(format!(
                    "Duplicate table alias '{}'",
                    join.alias
                )));
            }
        }
        Ok(ColumnScope::new(alias, table).with_joins(&self.joins))
    }

    pub(crate) fn render_select(&self, scope: &ColumnScope<'_>) -> Result<String> {
        if self.select.is_empty() {
            return SelectItem::all().render(scope);
        }
        let items = self
            .select
            .iter()
            .map(|item| item.render(scope))
            .collect::<Result<Vec<_>>>()?;
        Ok(items.join(", "))
    }

    /// `"table" AS "alias" LEFT JOIN ...`
    pub(crate) fn render_from(&self, scope: &ColumnScope<'_>) -> Result<String> {
        let mut from = format!(
            "{} AS {}",
            scope.base().quoted(),
            quote_identifier(scope.base_alias())
        );
        for join in &self.joins {
            from.push(' ');
            from.push_str(&join.render(scope)?);
        }
        Ok(from)
    }

    /// ` GROUP BY ... HAVING ...`, or an empty string
    pub(crate) fn render_grouping(&self, scope: &ColumnScope<'_>) -> Result<String> {
        let mut sql = String::new();
        if !self.group_by.is_empty() {
            let columns = self
                .group_by
                .iter()
                .map(|c| scope.resolve(c).map(|r| r.sql()))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having.as_str());
        }
        Ok(sql)
    }
}
