//! Axum HTTP handlers and the router that mounts them under `/api`.

pub mod model;
pub mod predictions;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Handler error: status plus a small JSON body.
pub type ApiError = (StatusCode, Json<Value>);

/// `{"message": …}` body, used by the read endpoints.
pub fn message(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "message": msg.into() })))
}

/// `{"error": …}` body, used by the predict endpoint.
pub fn error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/api/model-info/{uid}", get(model::model_info))
        .route("/api/predict/{uid}", post(predictions::predict))
        .route("/api/get-predictions/{uid}", get(predictions::get_predictions))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
