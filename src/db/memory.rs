use anyhow::{bail, Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::store::DocumentStore;
use crate::db::Document;

/// In-process document store for local runs and tests.
///
/// Stamps the same bookkeeping fields a hosted store would and understands
/// the query dialect produced by [`crate::db::query::QueryBuilder`].
#[derive(Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, Vec<Document>>>,
}

/// A query reduced to an optional projection and equality filters.
#[derive(Debug, PartialEq)]
struct ParsedQuery {
    fields: Option<Vec<String>>,
    filters: Vec<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in a container.
    pub fn len(&self, container: &str) -> usize {
        self.containers.read().get(container).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, container: &str) -> bool {
        self.len(container) == 0
    }

    /// Insert a document verbatim, bypassing bookkeeping. Used to seed fixtures.
    pub fn insert_raw(&self, container: &str, doc: Document) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .push(doc);
    }
}

fn doc_id(doc: &Document) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

fn parse_query(query: &str) -> Result<ParsedQuery> {
    let rest = query
        .trim()
        .strip_prefix("SELECT ")
        .with_context(|| format!("Unsupported query: {query}"))?;
    let (select, rest) = rest
        .split_once(" FROM c")
        .with_context(|| format!("Unsupported query: {query}"))?;

    let fields = match select.trim() {
        "*" => None,
        list => Some(
            list.split(',')
                .map(|f| {
                    f.trim()
                        .strip_prefix("c.")
                        .map(str::to_string)
                        .with_context(|| format!("Unsupported projection: {f}"))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    let mut filters = Vec::new();
    if !rest.is_empty() {
        let Some(clause) = rest.strip_prefix(" WHERE ") else {
            bail!("Unsupported query: {query}");
        };
        for predicate in clause.split(" AND ") {
            let (field, value) = predicate
                .split_once(" = ")
                .with_context(|| format!("Unsupported predicate: {predicate}"))?;
            let field = field
                .trim()
                .strip_prefix("c.")
                .with_context(|| format!("Unsupported predicate: {predicate}"))?;
            let value = value
                .trim()
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .with_context(|| format!("Unsupported predicate: {predicate}"))?;
            filters.push((field.to_string(), value.to_string()));
        }
    }

    Ok(ParsedQuery { fields, filters })
}

fn matches_filters(doc: &Document, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(field, value)| doc.get(field).and_then(Value::as_str) == Some(value.as_str()))
}

fn project(doc: &Document, fields: &Option<Vec<String>>) -> Document {
    match fields {
        None => doc.clone(),
        Some(fields) => fields
            .iter()
            .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
            .collect(),
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, container: &str, mut doc: Document) -> Result<Document> {
        let Some(id) = doc_id(&doc).map(str::to_string) else {
            bail!("Document is missing a string 'id'");
        };

        let rid = Uuid::new_v4().simple().to_string()[..12].to_string();
        doc.insert("_rid".into(), Value::String(rid.clone()));
        doc.insert(
            "_self".into(),
            Value::String(format!("dbs/memory/colls/{container}/docs/{rid}/")),
        );
        doc.insert("_etag".into(), Value::String(format!("\"{}\"", Uuid::new_v4())));
        doc.insert("_attachments".into(), Value::String("attachments/".into()));
        doc.insert("_ts".into(), Value::from(Utc::now().timestamp()));

        let mut containers = self.containers.write();
        let docs = containers.entry(container.to_string()).or_default();
        match docs.iter_mut().find(|d| doc_id(d) == Some(id.as_str())) {
            Some(existing) => *existing = doc.clone(),
            None => docs.push(doc.clone()),
        }
        Ok(doc)
    }

    async fn read(&self, container: &str, id: &str, _partition_key: &Value) -> Result<Document> {
        let containers = self.containers.read();
        containers
            .get(container)
            .and_then(|docs| docs.iter().find(|d| doc_id(d) == Some(id)))
            .cloned()
            .with_context(|| format!("Document {id} not found in {container}"))
    }

    async fn delete(&self, container: &str, id: &str, _partition_key: &Value) -> Result<()> {
        let mut containers = self.containers.write();
        let docs = containers
            .get_mut(container)
            .with_context(|| format!("Container {container} not found"))?;
        let before = docs.len();
        docs.retain(|d| doc_id(d) != Some(id));
        if docs.len() == before {
            bail!("Document {id} not found in {container}");
        }
        Ok(())
    }

    async fn query(&self, container: &str, query: &str) -> Result<Vec<Document>> {
        let parsed = parse_query(query)?;
        let containers = self.containers.read();
        Ok(containers
            .get(container)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_filters(d, &parsed.filters))
                    .map(|d| project(d, &parsed.fields))
                    .collect()
            })
            .unwrap_or_default())
    }
}
