use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::{message, ApiError};
use crate::auth::AuthUser;
use crate::db::format::format_object;
use crate::db::query::QueryBuilder;
use crate::db::Document;
use crate::state::AppState;

/// GET /api/model-info/:uid - Registered classifier metadata.
///
/// A store failure and a missing record both answer 404.
pub async fn model_info(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(uid): Path<String>,
) -> Result<Json<Document>, ApiError> {
    if uid.trim().is_empty() {
        return Err(message(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let query = QueryBuilder::new()
        .where_eq("userId", &state.config.model_owner_id)
        .build();

    match state
        .db
        .get_item(&query, &state.config.store.models_container)
        .await
    {
        Some(mut model) => {
            format_object(&mut model);
            Ok(Json(model))
        }
        None => Err(message(StatusCode::NOT_FOUND, "Model not found")),
    }
}
