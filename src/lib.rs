//! # adaptive-repository
//!
//! A schema-adaptive generic repository for PostgreSQL.
//!
//! The same application code runs against databases whose tables drifted over
//! time: columns are looked up in `information_schema` at runtime and every
//! query is shaped by what actually exists.
//!
//! ## Features
//!
//! - **Schema Catalog**: per-repository cache of table descriptors
//! - **Soft Delete**: enforced on every read when the table has `deleted_at`
//! - **Dynamic Filters**: equality, `ILIKE` for values containing `%`, `= ANY` for arrays
//! - **Pagination**: whitelisted ordering, clamped limits and a matching COUNT
//! - **Related Tables**: first-match resolution over candidate tables and foreign keys,
//!   aggregated as JSON arrays
//! - **SQL Injection Prevention**: identifiers are checked against the live schema and
//!   quoted; values are always bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adaptive_repository::{FindAllOptions, Filters, PageRequest, Repository, RepositoryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RepositoryConfig::builder("postgres://localhost/frete").build();
//!     let clientes = Repository::connect("clientes", config).await?;
//!
//!     let created = clientes
//!         .create(serde_json::json!({"nome": "Transportes Silva", "uf": "SP"}))
//!         .await?;
//!
//!     let page = clientes
//!         .find_all(
//!             FindAllOptions::new()
//!                 .filters(Filters::new().with("uf", "SP").with("nome", "%silva%"))
//!                 .page(PageRequest::new(1, 20)),
//!         )
//!         .await?;
//!     println!("{} of {} clients", page.data.len(), page.pagination.total);
//!
//!     clientes.soft_delete(created["id"].clone()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use adaptive_repository::RepositoryConfig;
//! use std::time::Duration;
//!
//! let config = RepositoryConfig::builder("postgres://localhost/frete")
//!     .schema("public")                              // Default: current_schema()
//!     .default_limit(20)                             // Default: 10
//!     .max_limit(200)                                // Default: 100
//!     .statement_timeout(Duration::from_secs(5))     // Default: none
//!     .snapshot_counts(true)                         // Default: false
//!     .build();
//! assert_eq!(config.primary_key, "id");
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events (SQL at `debug`, driver failures at
//! `error`) and leaves subscriber setup to the application.

pub mod catalog;
pub mod config;
pub mod error;
pub mod freight;
pub mod relation;
pub mod repository;
pub mod row;
pub mod soft_delete;
pub mod sql;

// Re-export main types for convenience
pub use catalog::{CatalogSource, ColumnInfo, PgCatalogSource, SchemaCatalog, TableDescriptor};
pub use config::{RepositoryConfig, RepositoryConfigBuilder};
pub use error::{RepositoryError, Result};
pub use freight::ClientRepository;
pub use relation::{
    FieldMapping, RelationDescriptor, RelationSpec, ResolvedRelation, resolve_relation,
};
pub use repository::{DeletedRecord, FindAllOptions, FindByOptions, Repository};
pub use row::{Row, decode_row};
pub use soft_delete::SoftDeletePolicy;
pub use sql::{
    Filters, Join, OrderDirection, PageRequest, PageResult, Pagination, QueryShape, SelectItem,
    SqlFragment, quote_identifier, validate_identifier,
};
