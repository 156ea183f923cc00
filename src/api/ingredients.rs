//! Ingredient API endpoints
//!
//! - GET /api/ingredients?name=<prefix> - Search by case-insensitive name prefix
//! - GET /api/ingredients/{id} - One ingredient

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::ApiQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::api::permissions::{enforce, ALLOW_ANY};
use crate::api::responses::IngredientResponse;

/// Query parameters for the ingredient search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
}

/// Build the ingredients router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(search_ingredients))
        .route("/ingredients/{id}", get(get_ingredient))
        .route_layer(from_fn_with_state(ALLOW_ANY, enforce))
}

/// GET /api/ingredients
async fn search_ingredients(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<IngredientResponse>>, ApiError> {
    let ingredients = state
        .ingredient_service
        .search(query.name.as_deref())
        .await?;
    Ok(Json(ingredients.into_iter().map(IngredientResponse::from).collect()))
}

/// GET /api/ingredients/{id}
async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<IngredientResponse>, ApiError> {
    let ingredient = state.ingredient_service.get(id).await?;
    Ok(Json(ingredient.into()))
}
