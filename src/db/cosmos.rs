//! Azure Cosmos DB (SQL API) client over the REST gateway.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;

use crate::db::store::DocumentStore;
use crate::db::Document;

const API_VERSION: &str = "2018-12-31";

/// Endpoint and key parsed from an `AccountEndpoint=…;AccountKey=…;` string.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub endpoint: String,
    pub key: Vec<u8>,
}

impl ConnectionInfo {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut endpoint = None;
        let mut key = None;
        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            match name {
                "AccountEndpoint" => endpoint = Some(value.trim_end_matches('/').to_string()),
                "AccountKey" => {
                    key = Some(BASE64.decode(value).context("AccountKey is not valid base64")?)
                }
                _ => {}
            }
        }
        Ok(Self {
            endpoint: endpoint.context("Connection string is missing AccountEndpoint")?,
            key: key.context("Connection string is missing AccountKey")?,
        })
    }
}

/// Master-key authorization token for one request, already URL-encoded.
pub fn master_key_token(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(key).context("Invalid account key")?;
    mac.update(payload.as_bytes());
    let sig = BASE64.encode(mac.finalize().into_bytes());
    let token = format!("type=master&ver=1.0&sig={sig}");
    Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Value of a document at a partition-key path such as `/userId`.
fn partition_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next()?;
    segments.try_fold(doc.get(first)?, |value, segment| value.get(segment))
}

/// Partition-key header value: `["v"]`, or `[{}]` when the document has none.
fn partition_header(value: Option<&Value>) -> String {
    match value {
        Some(v) => json!([v]).to_string(),
        None => "[{}]".to_string(),
    }
}

/// Collection metadata. Legacy non-partitioned containers have no
/// `partitionKey`.
#[derive(Deserialize)]
struct CollectionMeta {
    #[serde(rename = "partitionKey")]
    partition_key: Option<PartitionKeyDef>,
}

#[derive(Deserialize)]
struct PartitionKeyDef {
    paths: Vec<String>,
}

#[derive(Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents")]
    documents: Vec<Document>,
}

pub struct CosmosStore {
    client: reqwest::Client,
    conn: ConnectionInfo,
    database: String,
    /// Partition-key path per container, fetched on first use. `None` for
    /// non-partitioned containers.
    partition_paths: RwLock<HashMap<String, Option<String>>>,
}

impl CosmosStore {
    pub fn new(client: reqwest::Client, connection_string: &str, database: &str) -> Result<Self> {
        Ok(Self {
            client,
            conn: ConnectionInfo::parse(connection_string)?,
            database: database.to_string(),
            partition_paths: RwLock::new(HashMap::new()),
        })
    }

    fn collection_link(&self, container: &str) -> String {
        format!("dbs/{}/colls/{}", self.database, container)
    }

    /// Signed request builder for a resource.
    fn request(
        &self,
        method: Method,
        resource_type: &str,
        resource_link: &str,
        path: &str,
    ) -> Result<RequestBuilder> {
        let date = rfc1123_now();
        let token = master_key_token(
            &self.conn.key,
            method.as_str(),
            resource_type,
            resource_link,
            &date,
        )?;
        Ok(self
            .client
            .request(method, format!("{}/{}", self.conn.endpoint, path))
            .header("authorization", token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION))
    }

    async fn send(request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to call Cosmos DB ({what})"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Cosmos DB {what} returned {status}: {body}");
        }
        Ok(resp)
    }

    async fn partition_path(&self, container: &str) -> Result<Option<String>> {
        if let Some(path) = self.partition_paths.read().get(container) {
            return Ok(path.clone());
        }

        let link = self.collection_link(container);
        let req = self.request(Method::GET, "colls", &link, &link)?;
        let meta: CollectionMeta = Self::send(req, "read collection")
            .await?
            .json()
            .await
            .context("Failed to parse collection metadata")?;
        let path = meta
            .partition_key
            .and_then(|key| key.paths.into_iter().next());

        tracing::debug!("Partition key for {container}: {path:?}");
        self.partition_paths
            .write()
            .insert(container.to_string(), path.clone());
        Ok(path)
    }

    async fn query_pages(
        &self,
        container: &str,
        query: &str,
        max_items: Option<usize>,
    ) -> Result<Vec<Document>> {
        let link = self.collection_link(container);
        let body = serde_json::to_vec(&json!({ "query": query, "parameters": [] }))?;
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut req = self
                .request(Method::POST, "docs", &link, &format!("{link}/docs"))?
                .header(CONTENT_TYPE, "application/query+json")
                .header("x-ms-documentdb-isquery", "True")
                .header("x-ms-documentdb-query-enablecrosspartition", "True")
                .body(body.clone());
            if let Some(max) = max_items {
                req = req.header("x-ms-max-item-count", max.to_string());
            }
            if let Some(token) = &continuation {
                req = req.header("x-ms-continuation", token.clone());
            }

            let resp = Self::send(req, "query").await?;
            continuation = resp
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let page: QueryPage = resp.json().await.context("Failed to parse query page")?;
            documents.extend(page.documents);

            let satisfied = max_items.is_some_and(|max| documents.len() >= max);
            if continuation.is_none() || satisfied {
                break;
            }
        }

        Ok(documents)
    }
}

#[async_trait::async_trait]
impl DocumentStore for CosmosStore {
    async fn upsert(&self, container: &str, doc: Document) -> Result<Document> {
        let path = self.partition_path(container).await?;
        let link = self.collection_link(container);
        let req = self
            .request(Method::POST, "docs", &link, &format!("{link}/docs"))?
            .header("x-ms-documentdb-is-upsert", "True")
            .header(
                "x-ms-documentdb-partitionkey",
                partition_header(path.as_deref().and_then(|p| partition_value(&doc, p))),
            )
            .json(&doc);
        Self::send(req, "upsert")
            .await?
            .json()
            .await
            .context("Failed to parse upsert response")
    }

    async fn read(&self, container: &str, id: &str, partition_key: &Value) -> Result<Document> {
        let link = format!("{}/docs/{id}", self.collection_link(container));
        let req = self
            .request(Method::GET, "docs", &link, &link)?
            .header("x-ms-documentdb-partitionkey", partition_header(Some(partition_key)));
        Self::send(req, "read")
            .await?
            .json()
            .await
            .context("Failed to parse document")
    }

    async fn delete(&self, container: &str, id: &str, partition_key: &Value) -> Result<()> {
        let link = format!("{}/docs/{id}", self.collection_link(container));
        let req = self
            .request(Method::DELETE, "docs", &link, &link)?
            .header("x-ms-documentdb-partitionkey", partition_header(Some(partition_key)));
        Self::send(req, "delete").await?;
        Ok(())
    }

    async fn query(&self, container: &str, query: &str) -> Result<Vec<Document>> {
        self.query_pages(container, query, None).await
    }

    async fn query_first(&self, container: &str, query: &str) -> Result<Option<Document>> {
        Ok(self
            .query_pages(container, query, Some(1))
            .await?
            .into_iter()
            .next())
    }
}
