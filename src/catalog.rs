//! Schema catalog probe
//!
//! Answers "does table T have column C?" from `information_schema` and caches
//! the answer per table for the lifetime of the owning catalog. Table shape is
//! assumed stable while the process runs; `invalidate` exists for callers that
//! know better.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::{Result, database_failure};
use crate::sql::sanitize::{quote_identifier, quote_qualified};

/// Column metadata as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// SQL standard type name, e.g. `character varying`
    pub data_type: String,
    /// PostgreSQL type name, e.g. `varchar`, `int4`, `_text`
    pub udt_name: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, udt_name: impl Into<String>) -> Self {
        let udt_name = udt_name.into();
        Self {
            name: name.into(),
            data_type: udt_name.clone(),
            udt_name,
            nullable: true,
        }
    }

    /// Quoted type name usable as a CAST target
    pub fn cast_type(&self) -> String {
        quote_identifier(&self.udt_name)
    }

    /// Quoted name of the array type whose elements have this column's type
    pub fn array_cast_type(&self) -> String {
        if self.is_array() {
            self.cast_type()
        } else {
            quote_identifier(&format!("_{}", self.udt_name))
        }
    }

    pub fn is_array(&self) -> bool {
        self.udt_name.starts_with('_') || self.data_type.eq_ignore_ascii_case("ARRAY")
    }

    pub fn is_json(&self) -> bool {
        matches!(self.udt_name.as_str(), "json" | "jsonb")
    }
}

/// The live shape of one table
///
/// Carries the schema it was read from, so statements address the same table
/// that was inspected whatever the connection's `search_path` says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    schema: Option<String>,
    name: String,
    columns: BTreeMap<String, ColumnInfo>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = ColumnInfo>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Shorthand for tests and fixtures: every column typed as `text`
    pub fn with_columns(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::new(name, columns.iter().map(|c| ColumnInfo::new(*c, "text")))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column(&self, column: &str) -> Option<&ColumnInfo> {
        self.columns.get(column)
    }

    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.values()
    }

    /// Quoted table name, schema-qualified when the schema is known
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => quote_qualified(schema, &self.name),
            None => quote_identifier(&self.name),
        }
    }
}

/// Where table metadata comes from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Live shape of `table`, or `None` when it does not exist
    async fn load_table(&self, table: &str) -> Result<Option<TableDescriptor>>;
}

/// `information_schema` backed source
///
/// Without a configured schema, tables are looked up in `current_schema()` and
/// the descriptor records the schema that answered.
pub struct PgCatalogSource {
    pool: PgPool,
    schema: Option<String>,
}

impl PgCatalogSource {
    pub fn new(pool: PgPool, schema: Option<String>) -> Self {
        Self { pool, schema }
    }
}

#[async_trait]
impl CatalogSource for PgCatalogSource {
    async fn load_table(&self, table: &str) -> Result<Option<TableDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT table_schema::text AS table_schema,
                   column_name::text AS column_name,
                   data_type::text AS data_type,
                   udt_name::text AS udt_name,
                   is_nullable::text AS is_nullable
            FROM information_schema.columns
            WHERE table_schema = COALESCE($1, current_schema())
              AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(self.schema.as_deref())
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(database_failure(table, "describe"))?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let schema: String = first.try_get("table_schema")?;
        let columns = rows
            .iter()
            .map(|row| -> Result<ColumnInfo> {
                let nullable: String = row.try_get("is_nullable")?;
                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    udt_name: row.try_get("udt_name")?,
                    nullable: nullable == "YES",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(TableDescriptor::new(table, columns).in_schema(schema)))
    }
}

/// Per-instance cache of table descriptors
///
/// Concurrent first lookups of the same table may both hit the source; the
/// second write overwrites an identical value.
pub struct SchemaCatalog {
    source: Arc<dyn CatalogSource>,
    cache: RwLock<TableCache>,
}

type TableCache = HashMap<String, Option<Arc<TableDescriptor>>>;

impl SchemaCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn postgres(pool: PgPool, schema: Option<String>) -> Self {
        Self::new(Arc::new(PgCatalogSource::new(pool, schema)))
    }

    /// Describe a table, or `None` if it does not exist
    pub async fn describe(&self, table: &str) -> Result<Option<Arc<TableDescriptor>>> {
        if let Some(cached) = self.cached(table) {
            return Ok(cached);
        }

        let descriptor = self
            .source
            .load_table(table)
            .await?
            .filter(|d| !d.columns.is_empty())
            .map(Arc::new);
        tracing::debug!(
            table,
            schema = descriptor.as_ref().and_then(|d| d.schema()),
            exists = descriptor.is_some(),
            columns = descriptor.as_ref().map_or(0, |d| d.columns.len()),
            "probed table schema"
        );

        self.write_cache().insert(table.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.describe(table).await?.is_some())
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .describe(table)
            .await?
            .is_some_and(|d| d.has_column(column)))
    }

    /// Column names of a table; empty when the table does not exist
    pub async fn get_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .describe(table)
            .await?
            .map(|d| d.column_names())
            .unwrap_or_default())
    }

    /// Seed the cache with a known descriptor
    pub fn insert(&self, descriptor: TableDescriptor) -> Arc<TableDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.write_cache().insert(descriptor.name().to_string(), Some(descriptor.clone()));
        descriptor
    }

    pub fn invalidate(&self, table: &str) {
        self.write_cache().remove(table);
    }

    pub fn clear(&self) {
        self.write_cache().clear();
    }

    fn cached(&self, table: &str) -> Option<Option<Arc<TableDescriptor>>> {
        self.read_cache().get(table).cloned()
    }

    // Entries are replaced whole, so a poisoned cache is still consistent.
    fn read_cache(&self) -> RwLockReadGuard<'_, TableCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, TableCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory catalog source that counts how often it is asked
    #[derive(Default)]
    pub struct StaticCatalog {
        schema: Option<String>,
        tables: HashMap<String, Vec<ColumnInfo>>,
        pub loads: AtomicUsize,
    }

    impl StaticCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report every table as living in `schema`
        pub fn in_schema(mut self, schema: &str) -> Self {
            self.schema = Some(schema.to_string());
            self
        }

        pub fn table(mut self, name: &str, columns: &[&str]) -> Self {
            self.tables.insert(
                name.to_string(),
                columns.iter().map(|c| ColumnInfo::new(*c, "text")).collect(),
            );
            self
        }

        pub fn typed_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
            self.tables.insert(
                name.to_string(),
                columns.iter().map(|(c, t)| ColumnInfo::new(*c, *t)).collect(),
            );
            self
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        async fn load_table(&self, table: &str) -> Result<Option<TableDescriptor>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.tables.get(table).map(|columns| {
                let descriptor = TableDescriptor::new(table, columns.clone());
                match &self.schema {
                    Some(schema) => descriptor.in_schema(schema.as_str()),
                    None => descriptor,
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticCatalog;
    use super::*;

    fn catalog() -> (Arc<StaticCatalog>, SchemaCatalog) {
        let source = Arc::new(
            StaticCatalog::new()
                .table("clientes", &["id", "nome", "created_at", "deleted_at"])
                .table("motoristas", &["id", "nome"]),
        );
        let catalog = SchemaCatalog::new(source.clone());
        (source, catalog)
    }

    #[tokio::test]
    async fn test_has_column() {
        let (_, catalog) = catalog();
        assert!(catalog.has_column("clientes", "deleted_at").await.unwrap());
        assert!(!catalog.has_column("motoristas", "deleted_at").await.unwrap());
        assert!(!catalog.has_column("ausente", "id").await.unwrap());
    }

    #[tokio::test]
    async fn test_describe_is_cached_per_table() {
        let (source, catalog) = catalog();

        catalog.describe("clientes").await.unwrap();
        catalog.has_column("clientes", "nome").await.unwrap();
        catalog.get_columns("clientes").await.unwrap();
        assert_eq!(source.loads(), 1);

        catalog.describe("motoristas").await.unwrap();
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn test_missing_table_is_cached_too() {
        let (source, catalog) = catalog();
        assert!(!catalog.table_exists("ausente").await.unwrap());
        assert!(!catalog.table_exists("ausente").await.unwrap());
        assert_eq!(source.loads(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let (source, catalog) = catalog();
        catalog.describe("clientes").await.unwrap();
        catalog.invalidate("clientes");
        catalog.describe("clientes").await.unwrap();
        assert_eq!(source.loads(), 2);

        catalog.clear();
        catalog.describe("clientes").await.unwrap();
        assert_eq!(source.loads(), 3);
    }

    #[tokio::test]
    async fn test_get_columns() {
        let (_, catalog) = catalog();
        let columns = catalog.get_columns("motoristas").await.unwrap();
        assert_eq!(
            columns.into_iter().collect::<Vec<_>>(),
            vec!["id".to_string(), "nome".to_string()]
        );
        assert!(catalog.get_columns("ausente").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_seeds_cache() {
        let (source, catalog) = catalog();
        catalog.insert(TableDescriptor::with_columns("faturas", &["id", "valor"]));
        assert!(catalog.has_column("faturas", "valor").await.unwrap());
        assert_eq!(source.loads(), 0);
    }

    #[tokio::test]
    async fn test_descriptor_keeps_probed_schema() {
        let source = StaticCatalog::new()
            .in_schema("logistica")
            .table("clientes", &["id", "nome"]);
        let catalog = SchemaCatalog::new(Arc::new(source));

        let clientes = catalog.describe("clientes").await.unwrap().unwrap();
        assert_eq!(clientes.schema(), Some("logistica"));
        assert_eq!(clientes.quoted(), "\"logistica\".\"clientes\"");
    }

    #[test]
    fn test_quoted_without_schema() {
        let table = TableDescriptor::with_columns("clientes", &["id"]);
        assert_eq!(table.schema(), None);
        assert_eq!(table.quoted(), "\"clientes\"");
    }

    #[tokio::test]
    async fn test_poisoned_cache_keeps_caching() {
        let (source, catalog) = catalog();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = catalog.cache.write().unwrap();
            panic!("poison the cache lock");
        }));
        assert!(catalog.cache.is_poisoned());

        catalog.describe("clientes").await.unwrap();
        catalog.describe("clientes").await.unwrap();
        assert_eq!(source.loads(), 1);
    }

    #[test]
    fn test_column_cast_types() {
        let col = ColumnInfo::new("peso", "numeric");
        assert_eq!(col.cast_type(), "\"numeric\"");
        assert_eq!(col.array_cast_type(), "\"_numeric\"");

        let tags = ColumnInfo::new("tags", "_text");
        assert!(tags.is_array());
        assert_eq!(tags.array_cast_type(), "\"_text\"");

        assert!(ColumnInfo::new("extra", "jsonb").is_json());
    }
}
