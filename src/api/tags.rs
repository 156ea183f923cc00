//! Tag API endpoints
//!
//! Handles HTTP requests for tags (read-only reference data):
//! - GET /api/tags - All tags
//! - GET /api/tags/{id} - One tag

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::api::permissions::{enforce, ALLOW_ANY};
use crate::api::responses::TagResponse;

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/{id}", get(get_tag))
        .route_layer(from_fn_with_state(ALLOW_ANY, enforce))
}

/// GET /api/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagResponse>>, ApiError> {
    let tags = state.tag_service.list().await?;
    Ok(Json(tags.into_iter().map(TagResponse::from).collect()))
}

/// GET /api/tags/{id}
async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = state.tag_service.get(id).await?;
    Ok(Json(tag.into()))
}
