use anyhow::Result;
use serde_json::Value;

use crate::db::Document;

/// Backing document store, addressed by container name.
///
/// Implementations surface every failure (including "not found") as an
/// error; [`crate::db::service::DatabaseService`] decides what to do with it.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document by its `id`.
    async fn upsert(&self, container: &str, doc: Document) -> Result<Document>;

    async fn read(&self, container: &str, id: &str, partition_key: &Value) -> Result<Document>;

    async fn delete(&self, container: &str, id: &str, partition_key: &Value) -> Result<()>;

    /// Run a query across all partitions and collect every page.
    async fn query(&self, container: &str, query: &str) -> Result<Vec<Document>>;

    /// First match of a query, if any.
    async fn query_first(&self, container: &str, query: &str) -> Result<Option<Document>> {
        Ok(self.query(container, query).await?.into_iter().next())
    }
}
