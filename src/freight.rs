//! Logistics repositories
//!
//! Client addresses and notes have been stored under several table and column
//! names over the life of the freight schema. The relation specs below list
//! every known variant, newest first.

use serde_json::Value;
use sqlx::PgPool;

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::relation::{FieldMapping, RelationSpec};
use crate::repository::{FindAllOptions, Repository};
use crate::row::Row;
use crate::sql::filter::Filters;
use crate::sql::page::{PageRequest, PageResult};

pub const CLIENT_TABLE: &str = "clientes";
pub const CLIENT_ALIAS: &str = "c";

const CLIENT_FOREIGN_KEYS: &[&str] = &["cliente_id", "id_cliente", "client_id"];

/// A client's delivery addresses, as `enderecos`
pub const CLIENT_DELIVERY_ADDRESSES: RelationSpec = RelationSpec {
    name: "enderecos",
    tables: &["enderecos_cliente", "endereco_entrega", "enderecos_entrega"],
    foreign_keys: CLIENT_FOREIGN_KEYS,
    fields: &[
        FieldMapping::new("id", &["id"]),
        FieldMapping::new("street", &["logradouro", "rua", "endereco"]),
        FieldMapping::new("number", &["numero", "num"]),
        FieldMapping::new("complement", &["complemento"]),
        FieldMapping::new("district", &["bairro"]),
        FieldMapping::new("city", &["cidade", "municipio"]),
        FieldMapping::new("state", &["uf", "estado"]),
        FieldMapping::new("zip", &["cep"]),
        FieldMapping::new("main", &["principal", "is_principal"]),
    ],
    order_by: &["created_at", "id"],
};

/// Free-text notes attached to a client, as `observacoes`
pub const CLIENT_NOTES: RelationSpec = RelationSpec {
    name: "observacoes",
    tables: &["observacoes_cliente", "notas_cliente", "client_notes"],
    foreign_keys: CLIENT_FOREIGN_KEYS,
    fields: &[
        FieldMapping::new("id", &["id"]),
        FieldMapping::new("text", &["observacao", "texto", "nota", "note"]),
        FieldMapping::new("created_at", &["created_at"]),
    ],
    order_by: &["created_at", "id"],
};

/// Clients with their addresses and notes
pub struct ClientRepository {
    inner: Repository,
}

impl ClientRepository {
    pub async fn new(pool: PgPool, config: RepositoryConfig) -> Result<Self> {
        Self::from_repository(Repository::new(pool, CLIENT_TABLE, config).await?)
    }

    /// Wrap a repository already bound to the client table
    pub fn from_repository(repository: Repository) -> Result<Self> {
        Ok(Self {
            inner: repository.with_alias(CLIENT_ALIAS)?,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.inner
    }

    /// Client with `enderecos` and `observacoes`; each is `[]` when its table
    /// does not exist in this deployment
    pub async fn find_with_details(&self, id: impl Into<Value>) -> Result<Option<Row>> {
        self.inner
            .find_with_relations(id, &[CLIENT_DELIVERY_ADDRESSES, CLIENT_NOTES])
            .await
    }

    /// Page of clients, each with its delivery addresses
    pub async fn list_with_addresses(
        &self,
        page: PageRequest,
        filters: Filters,
    ) -> Result<PageResult<Row>> {
        let shape = self
            .inner
            .relations_shape(&[CLIENT_DELIVERY_ADDRESSES])
            .await?;
        self.inner
            .find_all(FindAllOptions::new().page(page).filters(filters).shape(shape))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::catalog::testing::StaticCatalog;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    async fn clients(source: StaticCatalog) -> ClientRepository {
        let url = "postgres://localhost/adaptive_repository_unit";
        let pool = PgPoolOptions::new().connect_lazy(url).unwrap();
        let repo = Repository::from_parts(
            pool,
            SchemaCatalog::new(Arc::new(source)),
            CLIENT_TABLE,
            RepositoryConfig::builder(url).build(),
        )
        .await
        .unwrap();
        ClientRepository::from_repository(repo).unwrap()
    }

    #[tokio::test]
    async fn test_legacy_address_table_is_found() {
        let clients = clients(
            StaticCatalog::new()
                .table("clientes", &["id", "nome", "deleted_at"])
                .table("enderecos_entrega", &["id", "client_id", "rua", "municipio", "cep"]),
        )
        .await;

        let relation = clients
            .repository()
            .resolve_relation(&CLIENT_DELIVERY_ADDRESSES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relation.descriptor().table_name(), "enderecos_entrega");
        assert_eq!(relation.descriptor().foreign_key, "client_id");
        assert_eq!(
            relation.fields().iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec!["id", "street", "city", "zip"]
        );
    }

    #[tokio::test]
    async fn test_current_table_wins_over_legacy() {
        let clients = clients(
            StaticCatalog::new()
                .table("clientes", &["id", "nome"])
                .table("enderecos_cliente", &["id", "cliente_id", "logradouro"])
                .table("enderecos_entrega", &["id", "client_id", "rua"]),
        )
        .await;

        let relation = clients
            .repository()
            .resolve_relation(&CLIENT_DELIVERY_ADDRESSES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relation.descriptor().table_name(), "enderecos_cliente");
    }

    #[tokio::test]
    async fn test_missing_notes_table_resolves_to_none() {
        let clients = clients(StaticCatalog::new().table("clientes", &["id", "nome"])).await;
        assert!(
            clients
                .repository()
                .resolve_relation(&CLIENT_NOTES)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(clients.repository().alias(), "c");
    }
}
