//! User API endpoints
//!
//! - GET/POST /api/users - List / register users
//! - GET /api/users/{id}, GET /api/users/me - User profiles
//! - POST /api/users/set_password - Change password
//! - PUT/DELETE /api/users/me/avatar - Avatar upload and removal
//! - GET /api/users/subscriptions - Authors the caller follows
//! - GET/POST/DELETE /api/users/{id}/subscribe - Follow edge to one author

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{
    ensure_page_exists, ApiJson, ApiQuery, PageQuery, QueryPairs, RecipesLimitQuery,
};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::permissions::{enforce, ALLOW_ANY, AUTHENTICATED};
use crate::api::responses::{
    AvatarResponse, Page, SubscriptionResponse, UserCreatedResponse, UserResponse,
};
use crate::models::PagedResult;
use crate::services::RegisterInput;

/// Request body for registration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

impl From<RegisterRequest> for RegisterInput {
    fn from(body: RegisterRequest) -> Self {
        Self {
            email: body.email,
            username: body.username,
            first_name: body.first_name,
            last_name: body.last_name,
            password: body.password,
        }
    }
}

/// Request body for a password change
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordRequest {
    pub new_password: String,
    pub current_password: String,
}

/// Request body for an avatar upload
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

/// Build the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(list_users)
                .post(register)
                .route_layer(from_fn_with_state(ALLOW_ANY, enforce)),
        )
        .route(
            "/users/me",
            get(get_me).route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/users/me/avatar",
            put(set_avatar)
                .delete(delete_avatar)
                .route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/users/set_password",
            post(set_password).route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/users/subscriptions",
            get(list_subscriptions).route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
        .route(
            "/users/{id}",
            get(get_user).route_layer(from_fn_with_state(ALLOW_ANY, enforce)),
        )
        .route(
            "/users/{id}/subscribe",
            get(get_subscription)
                .post(subscribe)
                .delete(unsubscribe)
                .route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
}

/// GET /api/users
async fn list_users(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ApiQuery(paging): ApiQuery<PageQuery>,
    ApiQuery(query): ApiQuery<QueryPairs>,
) -> Result<Json<Page<UserResponse>>, ApiError> {
    let params = paging.list_params(state.config.pagination.page_size)?;

    let page = state.user_service.list(&params).await?;
    ensure_page_exists(&page)?;

    let mut items = Vec::with_capacity(page.items.len());
    for user in page.items.iter().cloned() {
        let profile = state.user_service.profile(user, viewer.id()).await?;
        items.push(UserResponse::new(profile, &state.images));
    }
    let page = PagedResult {
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    };

    Ok(Json(Page::new(page, state.base_url(), "/api/users", &query)))
}

/// POST /api/users
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body.into()).await?;
    Ok((StatusCode::CREATED, Json(UserCreatedResponse::from(user))))
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.get(id).await?;
    let profile = state.user_service.profile(user, viewer.id()).await?;
    Ok(Json(UserResponse::new(profile, &state.images)))
}

/// GET /api/users/me
async fn get_me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let viewer = Some(user.id);
    let profile = state.user_service.profile(user, viewer).await?;
    Ok(Json(UserResponse::new(profile, &state.images)))
}

/// POST /api/users/set_password
async fn set_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .set_password(&user, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/users/me/avatar
async fn set_avatar(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<AvatarRequest>,
) -> Result<Json<AvatarResponse>, ApiError> {
    let updated = state
        .user_service
        .set_avatar(&user, body.avatar.as_deref())
        .await?;
    Ok(Json(AvatarResponse {
        avatar: updated.avatar.as_deref().map(|a| state.images.url(a)),
    }))
}

/// DELETE /api/users/me/avatar
async fn delete_avatar(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_avatar(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/subscriptions
async fn list_subscriptions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(paging): ApiQuery<PageQuery>,
    ApiQuery(RecipesLimitQuery { recipes_limit: limit }): ApiQuery<RecipesLimitQuery>,
    ApiQuery(query): ApiQuery<QueryPairs>,
) -> Result<Json<Page<SubscriptionResponse>>, ApiError> {
    let params = paging.list_params(state.config.pagination.page_size)?;

    let page = state.subscription_service.list(&user, &params, limit).await?;
    ensure_page_exists(&page)?;

    let page = page.map(|s| SubscriptionResponse::new(s, &state.images));
    Ok(Json(Page::new(
        page,
        state.base_url(),
        "/api/users/subscriptions",
        &query,
    )))
}

/// GET /api/users/{id}/subscribe
async fn get_subscription(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiQuery(RecipesLimitQuery { recipes_limit: limit }): ApiQuery<RecipesLimitQuery>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state.subscription_service.get(&user, id, limit).await?;
    Ok(Json(SubscriptionResponse::new(subscription, &state.images)))
}

/// POST /api/users/{id}/subscribe
async fn subscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiQuery(RecipesLimitQuery { recipes_limit: limit }): ApiQuery<RecipesLimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state.subscription_service.subscribe(&user, id, limit).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::new(subscription, &state.images)),
    ))
}

/// DELETE /api/users/{id}/subscribe
async fn unsubscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.subscription_service.unsubscribe(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
