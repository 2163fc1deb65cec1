//! Configuration for repositories
//!
//! Provides a builder pattern for configuring pagination limits, the
//! primary key column, and connection-level settings.

use std::time::Duration;

use crate::error::{RepositoryError, Result};

/// Configuration shared by repositories
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Schema to introspect and query (default: the connection's `current_schema()`)
    pub schema: Option<String>,
    /// Primary key column (default: "id")
    pub primary_key: String,
    /// Page size when the caller does not ask for one (default: 10)
    pub default_limit: i64,
    /// Upper bound for any requested page size (default: 100)
    pub max_limit: i64,
    /// Server-side statement timeout for pools opened by this crate
    pub statement_timeout: Option<Duration>,
    /// Pool size for pools opened by this crate (default: 10)
    pub max_connections: u32,
    /// Run the data and COUNT statements of a page in one snapshot (default: false)
    pub snapshot_counts: bool,
}

impl RepositoryConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::new(database_url)
    }

    /// Build a configuration from environment variables
    ///
    /// `DATABASE_URL` is required; every other setting falls back to its default.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| RepositoryError::Connection("DATABASE_URL is not set".to_string()))?;
        let mut builder = Self::builder(url);

        if let Ok(schema) = std::env::var("DATABASE_SCHEMA") {
            builder = builder.schema(schema);
        }
        if let Some(limit) = env_parse::<i64>("REPOSITORY_DEFAULT_LIMIT")? {
            builder = builder.default_limit(limit);
        }
        if let Some(limit) = env_parse::<i64>("REPOSITORY_MAX_LIMIT")? {
            builder = builder.max_limit(limit);
        }
        if let Some(ms) = env_parse::<u64>("REPOSITORY_STATEMENT_TIMEOUT_MS")? {
            builder = builder.statement_timeout(Duration::from_millis(ms));
        }
        if let Some(n) = env_parse::<u32>("REPOSITORY_MAX_CONNECTIONS")? {
            builder = builder.max_connections(n);
        }
        if let Some(snapshot) = env_parse::<bool>("REPOSITORY_SNAPSHOT_COUNTS")? {
            builder = builder.snapshot_counts(snapshot);
        }

        Ok(builder.build())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RepositoryError::validation(format!("Invalid value for {key}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Builder for RepositoryConfig
#[derive(Debug)]
pub struct RepositoryConfigBuilder {
    database_url: String,
    schema: Option<String>,
    primary_key: String,
    default_limit: i64,
    max_limit: i64,
    statement_timeout: Option<Duration>,
    max_connections: u32,
    snapshot_counts: bool,
}

impl RepositoryConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            schema: None,
            primary_key: "id".to_string(),
            default_limit: 10,
            max_limit: 100,
            statement_timeout: None,
            max_connections: 10,
            snapshot_counts: false,
        }
    }

    /// Introspect and query this schema instead of `current_schema()`
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the primary key column (default: "id")
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Set the default page size (default: 10)
    pub fn default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the maximum page size (default: 100)
    pub fn max_limit(mut self, limit: i64) -> Self {
        self.max_limit = limit;
        self
    }

    /// Set the statement timeout applied to connections opened by the crate
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Set the pool size (default: 10)
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Read page data and totals from one snapshot (default: false)
    pub fn snapshot_counts(mut self, enabled: bool) -> Self {
        self.snapshot_counts = enabled;
        self
    }

    /// Build the configuration
    ///
    /// Limits are normalized so that `1 <= default_limit <= max_limit`.
    pub fn build(self) -> RepositoryConfig {
        let max_limit = self.max_limit.max(1);
        let default_limit = self.default_limit.clamp(1, max_limit);

        RepositoryConfig {
            database_url: self.database_url,
            schema: self.schema,
            primary_key: self.primary_key,
            default_limit,
            max_limit,
            statement_timeout: self.statement_timeout,
            max_connections: self.max_connections.max(1),
            snapshot_counts: self.snapshot_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepositoryConfig::builder("postgres://localhost/test").build();

        assert_eq!(config.database_url, "postgres://localhost/test");
        assert!(config.schema.is_none());
        assert_eq!(config.primary_key, "id");
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.max_limit, 100);
        assert!(config.statement_timeout.is_none());
        assert_eq!(config.max_connections, 10);
        assert!(!config.snapshot_counts);
    }

    #[test]
    fn test_full_custom_config() {
        let config = RepositoryConfig::builder("postgres://localhost/test")
            .schema("logistica")
            .primary_key("codigo")
            .default_limit(25)
            .max_limit(50)
            .statement_timeout(Duration::from_secs(5))
            .max_connections(4)
            .snapshot_counts(true)
            .build();

        assert_eq!(config.schema.as_deref(), Some("logistica"));
        assert_eq!(config.primary_key, "codigo");
        assert_eq!(config.default_limit, 25);
        assert_eq!(config.max_limit, 50);
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_connections, 4);
        assert!(config.snapshot_counts);
    }

    #[test]
    fn test_default_limit_clamped_to_max() {
        let config = RepositoryConfig::builder("postgres://localhost/test")
            .default_limit(500)
            .max_limit(100)
            .build();
        assert_eq!(config.default_limit, 100);
    }

    #[test]
    fn test_non_positive_limits_normalized() {
        let config = RepositoryConfig::builder("postgres://localhost/test")
            .default_limit(0)
            .max_limit(-3)
            .max_connections(0)
            .build();
        assert_eq!(config.max_limit, 1);
        assert_eq!(config.default_limit, 1);
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_builder_order_independence() {
        let config1 = RepositoryConfig::builder("postgres://localhost/test")
            .max_limit(40)
            .default_limit(20)
            .build();

        let config2 = RepositoryConfig::builder("postgres://localhost/test")
            .default_limit(20)
            .max_limit(40)
            .build();

        assert_eq!(config1.default_limit, config2.default_limit);
        assert_eq!(config1.max_limit, config2.max_limit);
    }

    #[test]
    fn test_builder_debug() {
        let builder = RepositoryConfig::builder("postgres://localhost/test");
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("RepositoryConfigBuilder"));
    }
}
