use serde_json::Value;
use std::sync::Arc;

use crate::db::store::DocumentStore;
use crate::db::Document;

/// Container-scoped facade over a [`DocumentStore`].
///
/// Store errors are logged and reported as `None`, so callers cannot tell
/// a missing document from a failed call.
#[derive(Clone)]
pub struct DatabaseService {
    store: Arc<dyn DocumentStore>,
}

impl DatabaseService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn upsert_item(&self, item: Document, container: &str) -> Option<Document> {
        match self.store.upsert(container, item).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::error!("An error occurred upserting into {container}: {e:#}");
                None
            }
        }
    }

    pub async fn read_item(
        &self,
        id: &str,
        partition_key: &Value,
        container: &str,
    ) -> Option<Document> {
        match self.store.read(container, id, partition_key).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::error!("An error occurred reading {id} from {container}: {e:#}");
                None
            }
        }
    }

    pub async fn delete_item(
        &self,
        id: &str,
        partition_key: &Value,
        container: &str,
    ) -> Option<()> {
        match self.store.delete(container, id, partition_key).await {
            Ok(()) => Some(()),
            Err(e) => {
                tracing::error!("An error occurred deleting {id} from {container}: {e:#}");
                None
            }
        }
    }

    pub async fn query_items(&self, query: &str, container: &str) -> Option<Vec<Document>> {
        match self.store.query(container, query).await {
            Ok(docs) => Some(docs),
            Err(e) => {
                tracing::error!("An error occurred querying {container}: {e:#}");
                None
            }
        }
    }

    /// First document matching `query`, if any.
    pub async fn get_item(&self, query: &str, container: &str) -> Option<Document> {
        match self.store.query_first(container, query).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!("An error occurred querying {container}: {e:#}");
                None
            }
        }
    }
}
