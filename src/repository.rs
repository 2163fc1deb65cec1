//! Repository - generic CRUD over one live table
//!
//! A `Repository` is bound to a table whose shape is read from the catalog at
//! construction. Reads always apply the soft-delete clause when the table has
//! `deleted_at`; writes never touch rows the reads would not see, except
//! `restore` and `purge`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool, Row as _};

use crate::catalog::{ColumnInfo, SchemaCatalog, TableDescriptor};
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result, database_failure};
use crate::relation::{RelationSpec, ResolvedRelation};
use crate::row::{Row, decode_row};
use crate::soft_delete::SoftDeletePolicy;
use crate::sql::filter::{Filters, compile_filters};
use crate::sql::fragment::SqlFragment;
use crate::sql::page::{
    OrderDirection, PageLimits, PagePlan, PageRequest, PageResult, QueryBase, build_page,
    render_count, render_select, resolve_order,
};
use crate::sql::params::{Params, SqlParam, bind_params};
use crate::sql::sanitize::{quote_qualified, validate_identifier};
use crate::sql::shape::{QueryShape, SelectItem};
use crate::sql::write::{
    WriteStatement, WriteTarget, bind_column_value, build_delete, build_insert, build_purge,
    build_restore, build_soft_delete, build_update,
};

/// Alias of the repository's table in generated SQL
pub const DEFAULT_ALIAS: &str = "t";

/// Options of `find_all`
#[derive(Debug, Clone, Default)]
pub struct FindAllOptions {
    pub page: PageRequest,
    pub filters: Filters,
    pub shape: QueryShape,
}

impl FindAllOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn shape(mut self, shape: QueryShape) -> Self {
        self.shape = shape;
        self
    }
}

/// Options of `find_by`
#[derive(Debug, Clone, Default)]
pub struct FindByOptions {
    pub shape: QueryShape,
    pub order_by: Option<String>,
    pub order_direction: OrderDirection,
    /// Optional cap, clamped to the configured maximum
    pub limit: Option<i64>,
}

/// Key of a row removed or restored by a delete-family operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: Value,
}

/// Schema-adaptive repository for one table
pub struct Repository {
    pool: PgPool,
    config: RepositoryConfig,
    catalog: SchemaCatalog,
    table: Arc<TableDescriptor>,
    alias: String,
    soft_delete: SoftDeletePolicy,
    relations: RwLock<HashMap<RelationSpec, Option<Arc<ResolvedRelation>>>>,
}

impl Repository {
    /// Open a pool from `config` and bind a repository to `table`
    pub async fn connect(table: &str, config: RepositoryConfig) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(&config.database_url)
            .map_err(|e| RepositoryError::Connection(format!("Invalid database URL: {}", e)))?;
        if let Some(timeout) = config.statement_timeout {
            options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                RepositoryError::Connection(format!("Database connection failed: {}", e))
            })?;

        Self::new(pool, table, config).await
    }

    /// Bind a repository to `table` on an existing pool
    pub async fn new(pool: PgPool, table: &str, config: RepositoryConfig) -> Result<Self> {
        let catalog = SchemaCatalog::postgres(pool.clone(), config.schema.clone());
        Self::from_parts(pool, catalog, table, config).await
    }

    /// Bind a repository using a caller-supplied catalog
    pub async fn from_parts(
        pool: PgPool,
        catalog: SchemaCatalog,
        table: &str,
        config: RepositoryConfig,
    ) -> Result<Self> {
        let descriptor = catalog
            .describe(table)
            .await?
            .ok_or_else(|| RepositoryError::TableNotFound(table.to_string()))?;
        let soft_delete = SoftDeletePolicy::for_table(&descriptor);
        tracing::debug!(
            table,
            soft_delete = soft_delete.is_enabled(),
            "repository bound to table"
        );

        Ok(Self {
            pool,
            config,
            catalog,
            table: descriptor,
            alias: DEFAULT_ALIAS.to_string(),
            soft_delete,
            relations: RwLock::new(HashMap::new()),
        })
    }

    /// Use another alias for the table; needed when filters say `c.nome`
    pub fn with_alias(mut self, alias: &str) -> Result<Self> {
        validate_identifier(alias).map_err(RepositoryError::Validation)?;
        self.alias = alias.to_string();
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn soft_delete_policy(&self) -> SoftDeletePolicy {
        self.soft_delete
    }

    /// Soft-delete clause for this table under `alias`
    pub fn not_deleted_clause(&self, alias: &str) -> String {
        self.soft_delete.not_deleted_clause(alias)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// One page of rows plus pagination metadata
    pub async fn find_all(&self, options: FindAllOptions) -> Result<PageResult<Row>> {
        let plan = self.plan_page(&options)?;
        let table = self.table.name();
        tracing::debug!(table, sql = %plan.data_sql, count_sql = %plan.count_sql, "find all");

        let (data, total) = if self.config.snapshot_counts {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(database_failure(table, "find all"))?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(database_failure(table, "find all"))?;
            let page = self.run_page(&mut *tx, &plan).await?;
            tx.commit()
                .await
                .map_err(database_failure(table, "find all"))?;
            page
        } else {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(database_failure(table, "find all"))?;
            self.run_page(&mut *conn, &plan).await?
        };

        Ok(PageResult {
            data,
            pagination: plan.pagination(total),
        })
    }

    /// Row by primary key, or `None` when absent or soft-deleted
    pub async fn find_by_id(
        &self,
        id: impl Into<Value>,
        shape: &QueryShape,
    ) -> Result<Option<Row>> {
        let id = id.into();
        let pk = self.primary_key_column("find by id")?;
        if id.is_null() {
            return Err(RepositoryError::validation("find by id requires a non-null id"));
        }

        let scope = shape.scope(&self.alias, &self.table)?;
        let mut params = Params::new();
        let id_clause = format!(
            "{} = {}",
            quote_qualified(&self.alias, &pk.name),
            bind_column_value(&mut params, pk, &id)
        );
        let base = QueryBase {
            table: &self.table,
            alias: &self.alias,
            shape,
            where_clauses: vec![id_clause, self.soft_delete.not_deleted_clause(&self.alias)],
            params,
            primary_key: &self.config.primary_key,
        };
        let mut sql = render_select(&base, &scope, None)?;
        sql.push_str(" LIMIT 1");

        self.fetch_optional(&sql, base.params.values(), "find by id")
            .await
    }

    /// Every visible row matching `criteria`, ordered like `find_all`
    pub async fn find_by(&self, criteria: &Filters, options: FindByOptions) -> Result<Vec<Row>> {
        let scope = options.shape.scope(&self.alias, &self.table)?;
        let mut params = Params::new();
        let base = QueryBase {
            table: &self.table,
            alias: &self.alias,
            shape: &options.shape,
            where_clauses: self.where_clauses(criteria, &scope, &mut params)?,
            params,
            primary_key: &self.config.primary_key,
        };
        let order = resolve_order(
            &scope,
            &options.shape,
            options.order_by.as_deref(),
            options.order_direction,
            &self.config.primary_key,
        );

        let mut sql = render_select(&base, &scope, order.as_deref())?;
        let mut values = base.params.values().to_vec();
        if let Some(limit) = options.limit {
            values.push(SqlParam::Int(self.limits().resolve(Some(limit))));
            sql.push_str(&format!(" LIMIT ${}", values.len()));
        }

        let table = self.table.name();
        tracing::debug!(table, sql = %sql, "find by");
        let rows = bind_params(sqlx::query(&sql), &values)
            .fetch_all(&self.pool)
            .await
            .map_err(database_failure(table, "find by"))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    /// Number of visible rows matching `criteria`
    pub async fn count(&self, criteria: &Filters) -> Result<i64> {
        let shape = QueryShape::new();
        let scope = shape.scope(&self.alias, &self.table)?;
        let mut params = Params::new();
        let base = QueryBase {
            table: &self.table,
            alias: &self.alias,
            shape: &shape,
            where_clauses: self.where_clauses(criteria, &scope, &mut params)?,
            params,
            primary_key: &self.config.primary_key,
        };
        let sql = render_count(&base, &scope)?;

        let table = self.table.name();
        tracing::debug!(table, sql = %sql, "count");
        let row = bind_params(sqlx::query(&sql), base.params.values())
            .fetch_one(&self.pool)
            .await
            .map_err(database_failure(table, "count"))?;
        row.try_get::<i64, _>(0)
            .map_err(database_failure(table, "count"))
    }

    pub async fn exists(&self, criteria: &Filters) -> Result<bool> {
        Ok(self.count(criteria).await? > 0)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a row and return it as stored
    pub async fn create(&self, data: impl Serialize) -> Result<Row> {
        let data = into_row(data)?;
        let stmt = build_insert(&self.table, &data)?;
        let table = self.table.name();
        tracing::debug!(table, sql = %stmt.sql, "create");

        let row = bind_params(sqlx::query(&stmt.sql), stmt.params.values())
            .fetch_one(&self.pool)
            .await
            .map_err(database_failure(table, "create"))?;
        Ok(decode_row(&row))
    }

    /// Update the supplied columns of a visible row
    ///
    /// Returns `None` when the row is absent or soft-deleted. With nothing to
    /// set, returns the row unchanged.
    pub async fn update(&self, id: impl Into<Value>, data: impl Serialize) -> Result<Option<Row>> {
        let id = id.into();
        let data = into_row(data)?;
        match build_update(self.target(), &id, &data)? {
            Some(stmt) => self.execute_returning(&stmt, "update").await,
            None => self.find_by_id(id, &QueryShape::new()).await,
        }
    }

    /// Stamp `deleted_at`; `None` if the row is absent or already deleted
    pub async fn soft_delete(&self, id: impl Into<Value>) -> Result<Option<DeletedRecord>> {
        let stmt = build_soft_delete(self.target(), &id.into())?;
        self.execute_deleted(&stmt, "soft delete").await
    }

    /// Remove a visible row
    ///
    /// A soft-deleted row is left alone; use `restore` first, or `purge`.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<Option<DeletedRecord>> {
        let stmt = build_delete(self.target(), &id.into())?;
        self.execute_deleted(&stmt, "delete").await
    }

    /// Remove a row whether or not it is soft-deleted
    pub async fn purge(&self, id: impl Into<Value>) -> Result<Option<DeletedRecord>> {
        let stmt = build_purge(self.target(), &id.into())?;
        self.execute_deleted(&stmt, "purge").await
    }

    /// Clear `deleted_at`; `None` if the row is absent or not deleted
    pub async fn restore(&self, id: impl Into<Value>) -> Result<Option<DeletedRecord>> {
        let stmt = build_restore(self.target(), &id.into())?;
        self.execute_deleted(&stmt, "restore").await
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Resolve a relation once per repository and spec
    pub async fn resolve_relation(
        &self,
        spec: &RelationSpec,
    ) -> Result<Option<Arc<ResolvedRelation>>> {
        if let Some(cached) = self.cached_relation(spec) {
            return Ok(cached);
        }
        let resolved = spec.resolve(&self.catalog).await?.map(Arc::new);
        self.relations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*spec, resolved.clone());
        Ok(resolved)
    }

    /// SELECT item aggregating a relation into a JSON array
    ///
    /// An absent relation selects a constant empty array under the same name.
    pub async fn relation_select(&self, spec: &RelationSpec) -> Result<SelectItem> {
        let pk = self.primary_key_column("aggregate relation")?;
        Ok(match self.resolve_relation(spec).await? {
            Some(relation) => relation.select_item(&self.alias, &pk.name),
            None => SelectItem::expr(SqlFragment::from_static("'[]'::json"), spec.name),
        })
    }

    /// Row by primary key with each relation as a JSON array
    pub async fn find_with_relations(
        &self,
        id: impl Into<Value>,
        specs: &[RelationSpec],
    ) -> Result<Option<Row>> {
        let shape = self.relations_shape(specs).await?;
        self.find_by_id(id, &shape).await
    }

    /// `alias.*` plus one aggregate per relation
    pub async fn relations_shape(&self, specs: &[RelationSpec]) -> Result<QueryShape> {
        let mut shape = QueryShape::new().select(SelectItem::all());
        for spec in specs {
            shape = shape.select(self.relation_select(spec).await?);
        }
        Ok(shape)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn limits(&self) -> PageLimits {
        PageLimits::new(self.config.default_limit, self.config.max_limit)
    }

    fn target(&self) -> WriteTarget<'_> {
        WriteTarget::new(&self.table, &self.alias, &self.config.primary_key)
    }

    fn primary_key_column(&self, operation: &'static str) -> Result<&ColumnInfo> {
        self.table.column(&self.config.primary_key).ok_or_else(|| {
            RepositoryError::capability(self.table.name(), operation, &self.config.primary_key)
        })
    }

    fn cached_relation(&self, spec: &RelationSpec) -> Option<Option<Arc<ResolvedRelation>>> {
        self.relations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(spec)
            .cloned()
    }

    /// Soft-delete clause followed by the compiled filters
    fn where_clauses(
        &self,
        criteria: &Filters,
        scope: &crate::sql::shape::ColumnScope<'_>,
        params: &mut Params,
    ) -> Result<Vec<String>> {
        let mut clauses = vec![self.soft_delete.not_deleted_clause(&self.alias)];
        clauses.extend(compile_filters(criteria, scope, params)?);
        Ok(clauses)
    }

    pub(crate) fn plan_page(&self, options: &FindAllOptions) -> Result<PagePlan> {
        let scope = options.shape.scope(&self.alias, &self.table)?;
        let mut params = Params::new();
        let where_clauses = self.where_clauses(&options.filters, &scope, &mut params)?;
        build_page(
            QueryBase {
                table: &self.table,
                alias: &self.alias,
                shape: &options.shape,
                where_clauses,
                params,
                primary_key: &self.config.primary_key,
            },
            &options.page,
            self.limits(),
        )
    }

    async fn run_page(&self, conn: &mut PgConnection, plan: &PagePlan) -> Result<(Vec<Row>, i64)> {
        let table = self.table.name();
        let rows = bind_params(sqlx::query(&plan.data_sql), &plan.data_params())
            .fetch_all(&mut *conn)
            .await
            .map_err(database_failure(table, "find all"))?;
        let total = bind_params(sqlx::query(&plan.count_sql), plan.params.values())
            .fetch_one(&mut *conn)
            .await
            .and_then(|row| row.try_get::<i64, _>(0))
            .map_err(database_failure(table, "count"))?;
        Ok((rows.iter().map(decode_row).collect(), total))
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[SqlParam],
        operation: &'static str,
    ) -> Result<Option<Row>> {
        let table = self.table.name();
        tracing::debug!(table, operation, sql, "executing");
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_failure(table, operation))?;
        Ok(row.as_ref().map(decode_row))
    }

    async fn execute_returning(
        &self,
        stmt: &WriteStatement,
        operation: &'static str,
    ) -> Result<Option<Row>> {
        self.fetch_optional(&stmt.sql, stmt.params.values(), operation)
            .await
    }

    async fn execute_deleted(
        &self,
        stmt: &WriteStatement,
        operation: &'static str,
    ) -> Result<Option<DeletedRecord>> {
        let row = self.execute_returning(stmt, operation).await?;
        Ok(row.map(|mut row| DeletedRecord {
            id: row.remove(&self.config.primary_key).unwrap_or(Value::Null),
        }))
    }
}

/// Serialize write data into a column map
fn into_row(data: impl Serialize) -> Result<Row> {
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        _ => Err(RepositoryError::validation("Data must be a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::StaticCatalog;
    use crate::relation::FieldMapping;
    use serde_json::json;

    const ADDRESSES: RelationSpec = RelationSpec {
        name: "enderecos",
        tables: &["enderecos_cliente", "endereco_entrega"],
        foreign_keys: &["cliente_id", "id_cliente"],
        fields: &[FieldMapping::new("city", &["cidade"])],
        order_by: &[],
    };

    const NOTES: RelationSpec = RelationSpec {
        name: "observacoes",
        tables: &["observacoes_cliente"],
        foreign_keys: &["cliente_id"],
        fields: &[],
        order_by: &[],
    };

    fn source() -> StaticCatalog {
        StaticCatalog::new()
            .typed_table(
                "clientes",
                &[
                    ("id", "int4"),
                    ("nome", "varchar"),
                    ("uf", "bpchar"),
                    ("created_at", "timestamptz"),
                    ("deleted_at", "timestamptz"),
                ],
            )
            .table("motoristas", &["id", "nome"])
            .table("endereco_entrega", &["id", "id_cliente", "cidade"])
    }

    async fn repository(source: Arc<StaticCatalog>, table: &str) -> Result<Repository> {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/adaptive_repository_unit")
            .unwrap();
        let config = RepositoryConfig::builder("postgres://localhost/adaptive_repository_unit")
            .max_limit(50)
            .build();
        Repository::from_parts(pool, SchemaCatalog::new(source), table, config).await
    }

    #[tokio::test]
    async fn test_missing_table_is_reported() {
        let err = repository(Arc::new(source()), "ausente").await.err().unwrap();
        assert!(matches!(err, RepositoryError::TableNotFound(t) if t == "ausente"));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore_need_deleted_at() {
        let repo = repository(Arc::new(source()), "motoristas").await.unwrap();
        assert!(!repo.soft_delete_policy().is_enabled());
        assert_eq!(repo.not_deleted_clause("m"), "1=1");

        for err in [
            repo.soft_delete(1).await.unwrap_err(),
            repo.restore(1).await.unwrap_err(),
        ] {
            match err {
                RepositoryError::SchemaCapability { table, column, .. } => {
                    assert_eq!(table, "motoristas");
                    assert_eq!(column, "deleted_at");
                }
                other => panic!("Expected SchemaCapability, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_find_all_plan_applies_soft_delete_and_filters() {
        let repo = repository(Arc::new(source()), "clientes")
            .await
            .unwrap()
            .with_alias("c")
            .unwrap();
        let options = FindAllOptions::new()
            .filters(Filters::new().with("uf", "SP").with("c.nome", "%silva%"))
            .page(
                PageRequest::new(2, 500)
                    .order_by("nome; DROP TABLE clientes", OrderDirection::Asc),
            );
        let plan = repo.plan_page(&options).unwrap();

        assert_eq!(
            plan.data_sql,
            "SELECT \"c\".* FROM \"clientes\" AS \"c\" WHERE \"c\".\"deleted_at\" IS NULL AND \"c\".\"uf\" = CAST($1 AS \"bpchar\") AND \"c\".\"nome\"::text ILIKE $2 ORDER BY \"c\".\"created_at\" DESC LIMIT $3 OFFSET $4"
        );
        assert_eq!(
            plan.count_sql,
            "SELECT COUNT(*) FROM \"clientes\" AS \"c\" WHERE \"c\".\"deleted_at\" IS NULL AND \"c\".\"uf\" = CAST($1 AS \"bpchar\") AND \"c\".\"nome\"::text ILIKE $2"
        );
        assert_eq!((plan.limit, plan.offset), (50, 50));
    }

    #[tokio::test]
    async fn test_unknown_filter_column_fails_before_querying() {
        let repo = repository(Arc::new(source()), "clientes").await.unwrap();
        let err = repo
            .find_by(&Filters::new().with("senha", "x"), FindByOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownColumn { .. }));

        let err = repo.count(&Filters::new().with("senha", "x")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_non_object_and_unknown_keys() {
        let repo = repository(Arc::new(source()), "clientes").await.unwrap();
        assert!(matches!(
            repo.create(json!(["nome"])).await,
            Err(RepositoryError::Validation(_))
        ));
        assert!(matches!(
            repo.create(json!({"senha": "x"})).await,
            Err(RepositoryError::UnknownColumn { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_alias_is_rejected() {
        let repo = repository(Arc::new(source()), "clientes").await.unwrap();
        assert!(repo.with_alias("select").is_err());
    }

    #[tokio::test]
    async fn test_relation_resolution_is_cached() {
        let source = Arc::new(source());
        let repo = repository(source.clone(), "clientes").await.unwrap();
        let loads = source.loads();

        let first = repo.resolve_relation(&ADDRESSES).await.unwrap().unwrap();
        assert_eq!(first.descriptor().table_name(), "endereco_entrega");
        assert_eq!(first.descriptor().foreign_key, "id_cliente");
        let after_first = source.loads();
        assert!(after_first > loads);

        repo.resolve_relation(&ADDRESSES).await.unwrap();
        assert_eq!(source.loads(), after_first);
    }

    #[tokio::test]
    async fn test_relations_sharing_a_name_are_cached_apart() {
        const DRIVER_ADDRESSES: RelationSpec = RelationSpec {
            name: "enderecos",
            tables: &["motoristas"],
            foreign_keys: &["id"],
            fields: &[],
            order_by: &[],
        };
        let repo = repository(Arc::new(source()), "clientes").await.unwrap();

        let clients = repo.resolve_relation(&ADDRESSES).await.unwrap().unwrap();
        let drivers = repo
            .resolve_relation(&DRIVER_ADDRESSES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(clients.descriptor().table_name(), "endereco_entrega");
        assert_eq!(drivers.descriptor().table_name(), "motoristas");
    }

    #[tokio::test]
    async fn test_statements_address_the_probed_schema() {
        let source = source().in_schema("logistica");
        let repo = repository(Arc::new(source), "clientes")
            .await
            .unwrap()
            .with_alias("c")
            .unwrap();

        let plan = repo.plan_page(&FindAllOptions::default()).unwrap();
        assert!(
            plan.data_sql
                .starts_with("SELECT \"c\".* FROM \"logistica\".\"clientes\" AS \"c\"")
        );
        assert!(plan.count_sql.contains("FROM \"logistica\".\"clientes\" AS \"c\""));

        let insert = build_insert(repo.table(), &Row::new()).unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO \"logistica\".\"clientes\" DEFAULT VALUES RETURNING *"
        );

        let shape = repo.relations_shape(&[ADDRESSES]).await.unwrap();
        let scope = shape.scope("c", repo.table()).unwrap();
        let select = shape.render_select(&scope).unwrap();
        assert!(select.contains("FROM \"logistica\".\"endereco_entrega\" AS \"enderecos_rel\""));
    }

    #[tokio::test]
    async fn test_absent_relation_selects_empty_array() {
        let repo = repository(Arc::new(source()), "clientes")
            .await
            .unwrap()
            .with_alias("c")
            .unwrap();
        let shape = repo.relations_shape(&[ADDRESSES, NOTES]).await.unwrap();
        let scope = shape.scope("c", repo.table()).unwrap();
        let select = shape.render_select(&scope).unwrap();

        assert!(select.starts_with(
            "\"c\".*, (SELECT COALESCE(json_agg(json_build_object('city', \"enderecos_rel\".\"cidade\"))"
        ));
        assert!(select.contains(
            "WHERE \"enderecos_rel\".\"id_cliente\" = \"c\".\"id\" AND 1=1) AS \"enderecos\""
        ));
        assert!(select.ends_with("'[]'::json AS \"observacoes\""));
    }
}
