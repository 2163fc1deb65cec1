//! Pagination and ordering
//!
//! Plans the data statement of a page together with its COUNT statement. Both
//! share one FROM/JOIN/WHERE rendering so their predicates cannot drift apart.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::catalog::TableDescriptor;
use crate::error::{RepositoryError, Result};
use crate::row::Row;
use crate::sql::params::{Params, SqlParam};
use crate::sql::sanitize::quote_qualified;
use crate::sql::shape::{ColumnScope, QueryShape};

/// Column used when the requested ordering is absent or not allowed
pub const FALLBACK_ORDER_COLUMN: &str = "created_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    /// Parse `asc`/`desc` in any case; anything else is `DESC`
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            OrderDirection::Asc
        } else {
            OrderDirection::Desc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

fn default_page() -> i64 {
    1
}

/// Page, size and ordering as the caller asked for them
///
/// Nothing here is trusted: the page is coerced, the limit clamped and the
/// ordering column checked against the live schema when the plan is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: OrderDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            order_by: None,
            order_direction: OrderDirection::Desc,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(column.into());
        self.order_direction = direction;
        self
    }
}

/// Page size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl PageLimits {
    pub fn new(default_limit: i64, max_limit: i64) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
        }
    }

    /// `min(requested, max)`, at least 1; the default when nothing was asked
    pub fn resolve(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let limit = limit.max(1);
        let total = total.max(0);
        Self {
            page,
            limit,
            total,
            total_pages: total / limit + i64::from(total % limit != 0),
            has_next: page.saturating_mul(limit) < total,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> PageResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

impl PageResult<Row> {
    /// Deserialize every row into a caller type
    pub fn deserialize_into<T: DeserializeOwned>(self) -> Result<PageResult<T>> {
        let data = self
            .data
            .into_iter()
            .map(|row| serde_json::from_value(serde_json::Value::Object(row)))
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(RepositoryError::from)?;
        Ok(PageResult {
            data,
            pagination: self.pagination,
        })
    }
}

/// Base of a query: table, shape and the WHERE predicates already compiled
#[derive(Debug)]
pub struct QueryBase<'a> {
    pub table: &'a TableDescriptor,
    pub alias: &'a str,
    pub shape: &'a QueryShape,
    pub where_clauses: Vec<String>,
    pub params: Params,
    pub primary_key: &'a str,
}

/// The statements of one page
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub data_sql: String,
    pub count_sql: String,
    /// Parameters of the WHERE clause, shared by both statements
    pub params: Params,
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

impl PagePlan {
    /// WHERE parameters followed by LIMIT and OFFSET
    pub fn data_params(&self) -> Vec<SqlParam> {
        let mut params = self.params.values().to_vec();
        params.push(SqlParam::Int(self.limit));
        params.push(SqlParam::Int(self.offset));
        params
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        Pagination::new(self.page, self.limit, total)
    }
}

/// Resolve the ORDER BY clause
///
/// A requested column is used only if it exists in scope. Anything else falls
/// back to `created_at DESC`, then to the primary key, then to no ordering.
/// Grouped queries only order by their GROUP BY columns, falling back to
/// `created_at` when it is grouped on and to the first group column otherwise.
/// Never fails.
pub fn resolve_order(
    scope: &ColumnScope<'_>,
    shape: &QueryShape,
    requested: Option<&str>,
    direction: OrderDirection,
    primary_key: &str,
) -> Option<String> {
    let grouped = grouped_columns(scope, shape);

    if let Some(name) = requested.filter(|n| !n.trim().is_empty()) {
        match scope.try_resolve(name.trim()).map(|c| c.sql()) {
            Some(column) if grouped.as_ref().is_none_or(|g| g.contains(&column)) => {
                return Some(format!("{} {}", column, direction.as_sql()));
            }
            _ => tracing::debug!(
                table = scope.base().name(),
                requested = name,
                "ignoring order column not present in schema or grouping"
            ),
        }
    }

    if let Some(grouped) = grouped {
        let created = quote_qualified(scope.base_alias(), FALLBACK_ORDER_COLUMN);
        return grouped
            .iter()
            .find(|c| **c == created)
            .or_else(|| grouped.first())
            .map(|c| format!("{} DESC", c));
    }

    let base = scope.base();
    [FALLBACK_ORDER_COLUMN, primary_key]
        .into_iter()
        .find(|c| base.has_column(c))
        .map(|c| format!("{} DESC", quote_qualified(scope.base_alias(), c)))
}

/// Rendered GROUP BY columns, or `None` when the query is not grouped
fn grouped_columns(scope: &ColumnScope<'_>, shape: &QueryShape) -> Option<Vec<String>> {
    if !shape.is_grouped() {
        return None;
    }
    Some(
        shape
            .group_by
            .iter()
            .filter_map(|c| scope.try_resolve(c))
            .map(|c| c.sql())
            .collect(),
    )
}

/// Render `SELECT ... FROM ... WHERE ... [GROUP BY/HAVING] [ORDER BY]`
pub(crate) fn render_select(
    base: &QueryBase<'_>,
    scope: &ColumnScope<'_>,
    order: Option<&str>,
) -> Result<String> {
    let mut sql = format!(
        "SELECT {} FROM {}{}{}",
        base.shape.render_select(scope)?,
        base.shape.render_from(scope)?,
        render_where(&base.where_clauses),
        base.shape.render_grouping(scope)?
    );
    if let Some(order) = order {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    Ok(sql)
}

/// Render the COUNT statement matching `render_select`
///
/// Grouped queries count groups; joined queries count distinct primary keys.
pub(crate) fn render_count(base: &QueryBase<'_>, scope: &ColumnScope<'_>) -> Result<String> {
    let from = base.shape.render_from(scope)?;
    let where_sql = render_where(&base.where_clauses);

    if base.shape.is_grouped() {
        return Ok(format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {}{}{}) AS sub",
            from,
            where_sql,
            base.shape.render_grouping(scope)?
        ));
    }

    let counted = if base.shape.fans_out() && base.table.has_column(base.primary_key) {
        format!(
            "COUNT(DISTINCT {})",
            quote_qualified(base.alias, base.primary_key)
        )
    } else {
        "COUNT(*)".to_string()
    };
    Ok(format!("SELECT {} FROM {}{}", counted, from, where_sql))
}

fn render_where(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Plan the data and COUNT statements of one page
pub fn build_page(
    base: QueryBase<'_>,
    request: &PageRequest,
    limits: PageLimits,
) -> Result<PagePlan> {
    let scope = base.shape.scope(base.alias, base.table)?;

    let page = request.page.max(1);
    let limit = limits.resolve(request.limit);
    let offset = (page - 1).saturating_mul(limit);

    let order = resolve_order(
        &scope,
        base.shape,
        request.order_by.as_deref(),
        request.order_direction,
        base.primary_key,
    );

    let mut data_sql = render_select(&base, &scope, order.as_deref())?;
    let count_sql = render_count(&base, &scope)?;

    let next = base.params.len();
    data_sql.push_str(&format!(" LIMIT ${} OFFSET ${}", next + 1, next + 2));

    Ok(PagePlan {
        data_sql,
        count_sql,
        params: base.params,
        page,
        limit,
        offset,
    })
}
