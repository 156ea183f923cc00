//! Recipe API endpoints
//!
//! Handles HTTP requests for recipes:
//! - GET/POST /api/recipes - Filtered list / create
//! - GET/PATCH/DELETE /api/recipes/{id} - Read / author-only update and delete
//! - POST/DELETE /api/recipes/{id}/favorite - Favorites membership
//! - POST/DELETE /api/recipes/{id}/shopping_cart - Shopping cart membership
//! - GET /api/recipes/download_shopping_cart - Aggregated shopping list
//! - GET /api/recipes/{id}/get-link - Short link

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use serde::Deserialize;

use crate::api::common::{
    ensure_page_exists, flag, integer, ApiJson, ApiQuery, PageQuery, QueryPairs,
};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::permissions::{
    check_object, enforce, ALLOW_ANY, AUTHENTICATED, AUTHOR_OR_READ_ONLY,
};
use crate::api::responses::{Page, RecipeResponse, RecipeShortResponse, ShortLinkResponse};
use crate::models::{PagedResult, Recipe, RecipeFilter, RecipeRelation, User};
use crate::services::RecipeInput;

/// Build the recipes router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/recipes",
            get(list_recipes)
                .post(create_recipe)
                .route_layer(from_fn_with_state(AUTHOR_OR_READ_ONLY, enforce)),
        )
        .route(
            "/recipes/download_shopping_cart",
            get(download_shopping_cart).route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/recipes/{id}",
            get(get_recipe)
                .patch(update_recipe)
                .delete(delete_recipe)
                .route_layer(from_fn_with_state(AUTHOR_OR_READ_ONLY, enforce)),
        )
        .route(
            "/recipes/{id}/favorite",
            post(add_favorite)
                .delete(remove_favorite)
                .route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/recipes/{id}/shopping_cart",
            post(add_to_cart)
                .delete(remove_from_cart)
                .route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/recipes/{id}/get-link",
            get(get_link).route_layer(from_fn_with_state(ALLOW_ANY, enforce)),
        )
}

/// Single-valued filters of the recipe list
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    #[serde(default, deserialize_with = "integer")]
    pub author: Option<i64>,
    #[serde(default, deserialize_with = "flag")]
    pub is_favorited: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub is_in_shopping_cart: Option<bool>,
}

impl RecipeListQuery {
    /// Combine with the repeatable `tags` key; duplicate and blank slugs are dropped
    fn into_filter(self, pairs: &[(String, String)]) -> RecipeFilter {
        let mut tags: Vec<String> = Vec::new();
        for (_, slug) in pairs.iter().filter(|(k, _)| k == "tags") {
            let slug = slug.trim();
            if !slug.is_empty() && !tags.iter().any(|t| t == slug) {
                tags.push(slug.to_string());
            }
        }

        RecipeFilter {
            author: self.author,
            tags,
            is_favorited: self.is_favorited,
            is_in_shopping_cart: self.is_in_shopping_cart,
        }
    }
}

async fn render(state: &AppState, recipe: Recipe, viewer: Option<i64>) -> Result<RecipeResponse, ApiError> {
    let details = state.recipe_service.details(recipe, viewer).await?;
    Ok(RecipeResponse::new(details, &state.images))
}

/// GET /api/recipes
async fn list_recipes(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(filters): ApiQuery<RecipeListQuery>,
    ApiQuery(paging): ApiQuery<PageQuery>,
    ApiQuery(query): ApiQuery<QueryPairs>,
) -> Result<Json<Page<RecipeResponse>>, ApiError> {
    let filter = filters.into_filter(&query);
    let params = paging.list_params(state.config.pagination.page_size)?;

    let page = state
        .recipe_service
        .list(&filter, viewer.id(), &params)
        .await?;
    ensure_page_exists(&page)?;

    let mut results = Vec::with_capacity(page.items.len());
    for recipe in page.items.iter().cloned() {
        results.push(render(&state, recipe, viewer.id()).await?);
    }
    let page = PagedResult {
        items: results,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    };

    Ok(Json(Page::new(page, state.base_url(), "/api/recipes", &query)))
}

/// POST /api/recipes
async fn create_recipe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(input): ApiJson<RecipeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let recipe = state.recipe_service.create(&user, input).await?;
    let body = render(&state, recipe, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/recipes/{id}
async fn get_recipe(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = state.recipe_service.get(id).await?;
    Ok(Json(render(&state, recipe, viewer.id()).await?))
}

/// PATCH /api/recipes/{id}
async fn update_recipe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<RecipeInput>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let existing = state.recipe_service.get(id).await?;
    check_object(AUTHOR_OR_READ_ONLY, &Method::PATCH, Some(&user), existing.author_id)?;

    let recipe = state.recipe_service.update(&user, id, input).await?;
    Ok(Json(render(&state, recipe, Some(user.id)).await?))
}

/// DELETE /api/recipes/{id}
async fn delete_recipe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let existing = state.recipe_service.get(id).await?;
    check_object(AUTHOR_OR_READ_ONLY, &Method::DELETE, Some(&user), existing.author_id)?;

    state.recipe_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_relation(
    state: &AppState,
    relation: RecipeRelation,
    user: &User,
    id: i64,
) -> Result<(StatusCode, Json<RecipeShortResponse>), ApiError> {
    let recipe = state.recipe_service.add_to(relation, user, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeShortResponse::new(recipe, &state.images)),
    ))
}

/// POST /api/recipes/{id}/favorite
async fn add_favorite(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    add_relation(&state, RecipeRelation::Favorite, &user, id).await
}

/// DELETE /api/recipes/{id}/favorite
async fn remove_favorite(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .recipe_service
        .remove_from(RecipeRelation::Favorite, &user, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/recipes/{id}/shopping_cart
async fn add_to_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    add_relation(&state, RecipeRelation::ShoppingCart, &user, id).await
}

/// DELETE /api/recipes/{id}/shopping_cart
async fn remove_from_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .recipe_service
        .remove_from(RecipeRelation::ShoppingCart, &user, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/recipes/download_shopping_cart
async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let text = state.recipe_service.shopping_list(&user).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_list.txt\"",
            ),
            (header::CACHE_CONTROL, "no-store"),
        ],
        text,
    ))
}

/// GET /api/recipes/{id}/get-link
async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ShortLinkResponse>, ApiError> {
    let recipe = state.recipe_service.get(id).await?;
    Ok(Json(ShortLinkResponse {
        short_link: format!("{}/r/{}", state.base_url(), recipe.short_code),
    }))
}
