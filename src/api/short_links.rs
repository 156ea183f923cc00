//! Short link redirects
//!
//! - GET /r/{code} - 302 to the recipe page

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::api::middleware::{ApiError, AppState};

/// GET /r/{code}
pub async fn resolve_short_link(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let recipe = state.recipe_service.resolve_short_code(&code).await?;
    tracing::debug!("Short link {} -> recipe {}", code, recipe.id);
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, format!("/recipes/{}", recipe.id))],
    ))
}
