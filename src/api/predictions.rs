use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::api::{error, message, ApiError};
use crate::auth::AuthUser;
use crate::classifier::preprocess::preprocess_path;
use crate::classifier::{has_tumor, Classifier};
use crate::config::Config;
use crate::db::format::format_objects;
use crate::db::query::QueryBuilder;
use crate::db::Document;
use crate::models::{PredictionBatch, PredictionEntry};
use crate::state::AppState;

/// An uploaded image as received from the multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Removes every tracked temp file when dropped, whether or not
/// classification succeeded.
#[derive(Default)]
struct TempUploads {
    paths: Vec<PathBuf>,
}

impl TempUploads {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for TempUploads {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!("Failed to remove temp upload {}: {e}", path.display());
                }
            }
        }
    }
}

/// Temp path for an upload. Only the last component of the client filename
/// is used so uploads cannot escape the upload directory.
fn temp_path(config: &Config, filename: &str) -> PathBuf {
    let name = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    config.temp_upload_path(name)
}

/// Persist, preprocess and classify each upload in order. The first failure
/// aborts the batch; temp files are removed either way.
pub fn classify_uploads(
    classifier: &dyn Classifier,
    config: &Config,
    uploads: Vec<Upload>,
) -> anyhow::Result<Vec<PredictionEntry>> {
    let mut temp = TempUploads::default();
    let mut predictions = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let path = temp_path(config, &upload.filename);
        temp.track(path.clone());
        std::fs::write(&path, &upload.bytes)
            .with_context(|| format!("Failed to save {}", upload.filename))?;

        let pixels = preprocess_path(&path, classifier.image_size())?;
        let probability = classifier.predict(&pixels)?;
        tracing::debug!("{}: tumor probability {probability:.4}", upload.filename);

        predictions.push(PredictionEntry {
            filename: upload.filename,
            has_tumor: has_tumor(probability),
        });
    }

    Ok(predictions)
}

struct PredictForm {
    images: Option<Vec<Upload>>,
    batch_id: Option<String>,
}

async fn read_form(mut multipart: Multipart, max_files: usize) -> Result<PredictForm, ApiError> {
    let mut images: Option<Vec<Upload>> = None;
    let mut batch_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("images") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;
                let files = images.get_or_insert_with(Vec::new);
                files.push(Upload { filename, bytes });
                if files.len() > max_files {
                    return Err(error(
                        StatusCode::BAD_REQUEST,
                        format!("Too many files. Maximum allowed is {max_files}"),
                    ));
                }
            }
            Some("batchId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| error(StatusCode::BAD_REQUEST, e.body_text()))?;
                batch_id = Some(text);
            }
            _ => {}
        }
    }

    Ok(PredictForm { images, batch_id })
}

/// POST /api/predict/:uid - Classify up to `max_files` uploaded scans and
/// store the batch.
pub async fn predict(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(uid): Path<String>,
    multipart: Multipart,
) -> Result<Json<PredictionBatch>, ApiError> {
    if uid.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "uid required"));
    }

    let form = read_form(multipart, state.config.max_files).await?;
    let Some(uploads) = form.images else {
        return Err(error(StatusCode::BAD_REQUEST, "No image files provided"));
    };
    if uploads.first().map_or(true, |u| u.filename.is_empty()) {
        return Err(error(StatusCode::BAD_REQUEST, "No images selected"));
    }

    let count = uploads.len();
    let classifier = state.classifier.clone();
    let config = state.config.clone();
    let predictions =
        tokio::task::spawn_blocking(move || classify_uploads(classifier.as_ref(), &config, uploads))
            .await
            .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| {
                tracing::error!("Prediction failed for {uid}: {e:#}");
                error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
            })?;

    let batch = PredictionBatch {
        id: Uuid::new_v4().to_string(),
        batch_id: form.batch_id,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        user_id: uid,
        predictions,
    };
    tracing::info!(
        "Classified {count} image(s) for {} (batch {:?})",
        batch.user_id,
        batch.batch_id
    );

    let doc = batch
        .to_document()
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    // The service logs store failures; the client still gets its results.
    state
        .db
        .upsert_item(doc, &state.config.store.predictions_container)
        .await;

    Ok(Json(batch))
}

/// GET /api/get-predictions/:uid - Prediction history, batches merged,
/// newest first.
pub async fn get_predictions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(uid): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    if uid.trim().is_empty() {
        return Err(message(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let query = QueryBuilder::new().where_eq("userId", &uid).build();
    let uploads = state
        .db
        .query_items(&query, &state.config.store.predictions_container)
        .await
        .unwrap_or_default();

    if uploads.is_empty() {
        return Err(message(StatusCode::NOT_FOUND, "No predictions found"));
    }

    let mut merged = merge_batches(uploads);
    format_objects(&mut merged);
    Ok(Json(merged))
}

fn batch_key(doc: &Document) -> Option<String> {
    doc.get("batchId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn timestamp(doc: &Document) -> &str {
    doc.get("timestamp").and_then(Value::as_str).unwrap_or("")
}

/// Merge documents sharing a `batchId` by concatenating their predictions,
/// then sort newest first.
///
/// Documents without a batch id stand alone, keyed by timestamp; a later
/// document with the same timestamp replaces the earlier one. The first
/// document seen for a batch keeps its other fields.
pub fn merge_batches(uploads: Vec<Document>) -> Vec<Document> {
    let mut merged: Vec<Document> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for mut upload in uploads {
        match batch_key(&upload) {
            None => {
                let key = upload
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                match positions.get(&key) {
                    Some(&i) => merged[i] = upload,
                    None => {
                        positions.insert(key, merged.len());
                        merged.push(upload);
                    }
                }
            }
            Some(key) => match positions.get(&key) {
                Some(&i) => {
                    let extra = match upload.remove("predictions") {
                        Some(Value::Array(list)) => list,
                        _ => Vec::new(),
                    };
                    let existing = merged[i]
                        .entry("predictions")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    match existing {
                        Value::Array(list) => list.extend(extra),
                        other => *other = Value::Array(extra),
                    }
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(upload);
                }
            },
        }
    }

    merged.sort_by(|a, b| timestamp(b).cmp(timestamp(a)));
    merged
}
