use serde::{Deserialize, Serialize};

use crate::db::Document;

/// One classified image within a prediction batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEntry {
    pub filename: String,
    pub has_tumor: bool,
}

/// The document stored for each predict call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionBatch {
    pub id: String,
    /// Client-supplied grouping key; `null` when absent.
    pub batch_id: Option<String>,
    /// RFC 3339, sorts lexicographically.
    pub timestamp: String,
    pub user_id: String,
    pub predictions: Vec<PredictionEntry>,
}

impl PredictionBatch {
    pub fn to_document(&self) -> anyhow::Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("Prediction batch serialized to non-object: {other}"),
        }
    }
}
