//! Integration tests for the HTTP API.
//!
//! These drive the full router with an in-memory document store and a
//! fixed-output classifier, so no trained weights or database are needed.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tumor_scan::api;
use tumor_scan::auth::{AuthUser, Claims, TokenVerifier};
use tumor_scan::classifier::Classifier;
use tumor_scan::config::Config;
use tumor_scan::db::memory::MemoryStore;
use tumor_scan::db::store::DocumentStore;
use tumor_scan::db::Document;
use tumor_scan::state::AppState;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "----tumor-scan-boundary";

/// Classifier that ignores its input and returns a fixed probability.
struct FixedClassifier(f32);

impl Classifier for FixedClassifier {
    fn image_size(&self) -> u32 {
        8
    }

    fn predict(&self, pixels: &[f32]) -> anyhow::Result<f32> {
        assert_eq!(pixels.len(), 64);
        Ok(self.0)
    }
}

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    upload_dir: tempfile::TempDir,
}

fn harness(probability: f32) -> Harness {
    let upload_dir = tempfile::tempdir().unwrap();
    let config = Config {
        upload_dir: upload_dir.path().to_path_buf(),
        auth_secret: SECRET.to_string(),
        ..Config::default()
    };
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_parts(
        config,
        store.clone(),
        Arc::new(FixedClassifier(probability)),
    )
    .unwrap();
    Harness {
        app: api::router(state.clone()),
        state,
        store,
        upload_dir,
    }
}

fn claims(user: &str) -> Claims {
    Claims {
        sub: user.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    }
}

fn token(user: &str) -> String {
    TokenVerifier::new(SECRET.as_bytes())
        .encode(&claims(user))
        .unwrap()
}

fn png() -> Vec<u8> {
    let img = image::GrayImage::from_pixel(20, 20, image::Luma([200]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Build a multipart body with one `images` part per file.
fn multipart_body(files: &[(&str, Vec<u8>)], batch_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(id) = batch_id {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"batchId\"\r\n\r\n");
        body.extend_from_slice(id.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn predict_request(user: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/predict/{user}"))
        .header("authorization", format!("Bearer {}", token(user)))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token(user)))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

// ─── predict ─────────────────────────────────────────────

#[tokio::test]
async fn test_predict_single_image() {
    let h = harness(0.9);
    let body = multipart_body(&[("scan.png", png())], Some("batch-7"));
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = json["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0]["filename"], "scan.png");
    assert_eq!(predictions[0]["hasTumor"], true);
    assert_eq!(json["batchId"], "batch-7");
    assert_eq!(json["userId"], "user-1");
    assert!(json["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(json["timestamp"].is_string());

    // Persisted once, temp files gone
    assert_eq!(h.store.len("Predictions"), 1);
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_predict_below_threshold_without_batch_id() {
    let h = harness(0.2);
    let body = multipart_body(&[("a.png", png()), ("b.png", png())], None);
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["batchId"], Value::Null);
    let predictions = json["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p["hasTumor"] == false));
}

#[tokio::test]
async fn test_predict_without_files_is_bad_request() {
    let h = harness(0.9);
    let body = multipart_body(&[], Some("batch-1"));
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No image files provided");
    assert!(h.store.is_empty("Predictions"));
}

#[tokio::test]
async fn test_predict_empty_filename_is_bad_request() {
    let h = harness(0.9);
    let body = multipart_body(&[("", Vec::new())], None);
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No images selected");
}

#[tokio::test]
async fn test_predict_too_many_files_is_bad_request() {
    let h = harness(0.9);
    let image = png();
    let names: Vec<String> = (0..101).map(|i| format!("scan_{i}.png")).collect();
    let files: Vec<(&str, Vec<u8>)> = names
        .iter()
        .map(|n| (n.as_str(), image.clone()))
        .collect();
    let body = multipart_body(&files, None);
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Too many files. Maximum allowed is 100");
    assert!(h.store.is_empty("Predictions"));
}

#[tokio::test]
async fn test_predict_undecodable_image_fails_whole_batch() {
    let h = harness(0.9);
    let body = multipart_body(
        &[("good.png", png()), ("broken.png", b"not an image".to_vec())],
        None,
    );
    let (status, json) = send(&h.app, predict_request("user-1", body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("broken.png"));
    assert!(h.store.is_empty("Predictions"));
    assert_eq!(std::fs::read_dir(h.upload_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_predict_requires_token() {
    let h = harness(0.9);
    let req = Request::builder()
        .method("POST")
        .uri("/api/predict/user-1")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(&[("scan.png", png())], None)))
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forged_token_rejected() {
    let h = harness(0.9);
    let forged = TokenVerifier::new(b"other-secret")
        .encode(&claims("user-1"))
        .unwrap();
    let req = Request::builder()
        .uri("/api/get-predictions/user-1")
        .header("authorization", format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token is invalid");
}

// ─── get-predictions ─────────────────────────────────────

#[tokio::test]
async fn test_get_predictions_unknown_user_is_not_found() {
    let h = harness(0.9);
    let (status, json) = send(&h.app, get_request("/api/get-predictions/nobody", "nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "No predictions found");
}

#[tokio::test]
async fn test_get_predictions_merges_batches_and_sorts() {
    let h = harness(0.9);
    let seed = [
        json!({
            "id": "1",
            "batchId": "b1",
            "timestamp": "2025-03-01T10:00:00.000000Z",
            "userId": "u1",
            "predictions": [
                {"filename": "a.png", "hasTumor": true},
                {"filename": "b.png", "hasTumor": false}
            ]
        }),
        json!({
            "id": "2",
            "batchId": null,
            "timestamp": "2025-03-02T10:00:00.000000Z",
            "userId": "u1",
            "predictions": [{"filename": "solo.png", "hasTumor": false}]
        }),
        json!({
            "id": "3",
            "batchId": "b1",
            "timestamp": "2025-03-01T10:05:00.000000Z",
            "userId": "u1",
            "predictions": [{"filename": "c.png", "hasTumor": true}]
        }),
        json!({
            "id": "4",
            "batchId": "b1",
            "timestamp": "2025-03-03T10:00:00.000000Z",
            "userId": "someone-else",
            "predictions": [{"filename": "x.png", "hasTumor": true}]
        }),
    ];
    for d in seed {
        h.store.upsert("Predictions", doc(d)).await.unwrap();
    }

    let (status, json) = send(&h.app, get_request("/api/get-predictions/u1", "u1")).await;
    assert_eq!(status, StatusCode::OK);

    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // Newest first: the standalone upload, then the merged batch
    assert_eq!(entries[0]["id"], "2");
    assert_eq!(entries[1]["batchId"], "b1");
    assert_eq!(entries[1]["predictions"].as_array().unwrap().len(), 3);
    for entry in entries {
        let obj = entry.as_object().unwrap();
        assert!(!obj.contains_key("_etag"));
        assert!(!obj.contains_key("_rid"));
        assert!(!obj.contains_key("_ts"));
    }
}

#[tokio::test]
async fn test_predict_then_history() {
    let h = harness(0.7);
    for _ in 0..2 {
        let body = multipart_body(&[("scan.png", png())], Some("shared"));
        let (status, _) = send(&h.app, predict_request("u2", body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&h.app, get_request("/api/get-predictions/u2", "u2")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["predictions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_predictions_empty_uid_is_unauthorized() {
    let h = harness(0.9);
    let result = api::predictions::get_predictions(
        State(h.state.clone()),
        AuthUser(claims("u1")),
        Path(String::new()),
    )
    .await;
    let (status, body) = result.unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.0["message"], "Unauthorized");
}

// ─── model-info ──────────────────────────────────────────

#[tokio::test]
async fn test_model_info_returns_formatted_record() {
    let h = harness(0.9);
    h.store
        .upsert(
            "Models",
            doc(json!({
                "id": "m1",
                "userId": "1",
                "name": "brain_tumor_classifier",
                "accuracy": 0.93
            })),
        )
        .await
        .unwrap();

    let (status, json) = send(&h.app, get_request("/api/model-info/u1", "u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "brain_tumor_classifier");
    for field in ["_attachments", "_etag", "_rid", "_ts", "_self"] {
        assert!(json.get(field).is_none(), "{field} leaked");
    }
}

#[tokio::test]
async fn test_model_info_missing_is_not_found() {
    let h = harness(0.9);
    let (status, json) = send(&h.app, get_request("/api/model-info/u1", "u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Model not found");
}

#[tokio::test]
async fn test_model_info_empty_uid_is_unauthorized() {
    let h = harness(0.9);
    let result =
        api::model::model_info(State(h.state.clone()), AuthUser(claims("u1")), Path(String::new()))
            .await;
    let (status, body) = result.unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.0["message"], "Unauthorized");
}
