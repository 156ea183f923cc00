//! API middleware
//!
//! Contains:
//! - Shared application state
//! - `ApiError`, the single JSON error type every handler returns
//! - Token authentication (`Authorization: Token <t>` or `Bearer <t>`)
//! - Extractors for the authenticated caller

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxIngredientRepository, SqlxRecipeRepository, SqlxSessionRepository,
    SqlxSubscriptionRepository, SqlxTagRepository, SqlxUserRecipeRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    FieldErrors, ImageStore, IngredientService, IngredientServiceError, RecipeService,
    RecipeServiceError, SubscriptionService, SubscriptionServiceError, TagService,
    TagServiceError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub tag_service: Arc<TagService>,
    pub ingredient_service: Arc<IngredientService>,
    pub recipe_service: Arc<RecipeService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub images: Arc<ImageStore>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: Config) -> Self {
        let images = Arc::new(ImageStore::new(
            config.media.clone(),
            config.server.base_url(),
        ));

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());
        let ingredient_repo = SqlxIngredientRepository::boxed(pool.clone());
        let recipe_repo = SqlxRecipeRepository::boxed(pool.clone());
        let user_recipe_repo = SqlxUserRecipeRepository::boxed(pool);

        let user_service = UserService::new(
            user_repo.clone(),
            session_repo,
            subscription_repo.clone(),
            images.clone(),
        )
        .with_session_days(config.auth.session_days);
        let recipe_service = RecipeService::new(
            recipe_repo.clone(),
            tag_repo.clone(),
            ingredient_repo.clone(),
            user_recipe_repo,
            user_repo.clone(),
            subscription_repo.clone(),
            images.clone(),
        );
        let subscription_service =
            SubscriptionService::new(subscription_repo, user_repo, recipe_repo);

        Self {
            config: Arc::new(config),
            user_service: Arc::new(user_service),
            tag_service: Arc::new(TagService::new(tag_repo)),
            ingredient_service: Arc::new(IngredientService::new(ingredient_repo)),
            recipe_service: Arc::new(recipe_service),
            subscription_service: Arc::new(subscription_service),
            images,
        }
    }

    /// Public base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.config.server.base_url()
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The caller if a valid token was presented, otherwise `None`
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

/// The raw token the caller authenticated with
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Validation error carrying a `{field: [messages]}` map
    pub fn invalid_fields(errors: FieldErrors) -> Self {
        let details = serde_json::to_value(&errors).unwrap_or_default();
        Self::with_details("VALIDATION_ERROR", errors.to_string(), details)
    }

    /// Validation error on a single query or body field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::invalid_fields(FieldErrors::single(field, message))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(mut self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{}", self.error.message);
            self.error.message = "Internal server error".to_string();
            self.error.details = None;
        }

        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Service error mapping
// ============================================================================

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::internal_error(format!("{:#}", e))
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::invalid_fields(errors)
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::ValidationError(errors) => ApiError::invalid_fields(errors),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User {} not found", id)),
            UserServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(id) => ApiError::not_found(format!("Tag {} not found", id)),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<IngredientServiceError> for ApiError {
    fn from(e: IngredientServiceError) -> Self {
        match e {
            IngredientServiceError::NotFound(id) => {
                ApiError::not_found(format!("Ingredient {} not found", id))
            }
            IngredientServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            IngredientServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<RecipeServiceError> for ApiError {
    fn from(e: RecipeServiceError) -> Self {
        match e {
            RecipeServiceError::ValidationError(errors) => ApiError::invalid_fields(errors),
            RecipeServiceError::NotFound(msg) => ApiError::not_found(msg),
            RecipeServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            RecipeServiceError::Conflict(msg) => ApiError::conflict(msg),
            RecipeServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<SubscriptionServiceError> for ApiError {
    fn from(e: SubscriptionServiceError) -> Self {
        match e {
            SubscriptionServiceError::ValidationError(errors) => ApiError::invalid_fields(errors),
            SubscriptionServiceError::NotFound(msg) => ApiError::not_found(msg),
            SubscriptionServiceError::Conflict(msg) => ApiError::conflict(msg),
            SubscriptionServiceError::InternalError(e) => internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract the token from `Authorization: Token <t>` or `Authorization: Bearer <t>`
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(token.to_string())
    } else {
        None
    }
}

/// Authentication middleware applied to every API route.
///
/// A request without a token passes through anonymously. A presented token
/// that does not map to a live session is rejected with 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_token(request.headers()) {
        let user = state
            .user_service
            .validate_session(&token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid token."))?;

        request.extensions_mut().insert(AuthenticatedUser(user));
        request.extensions_mut().insert(SessionToken(token));
    }
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|au| au.0.clone()),
        ))
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_token_schemes() {
        assert_eq!(extract_token(&headers("Token abc")), Some("abc".to_string()));
        assert_eq!(extract_token(&headers("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(&headers("token  abc ")), Some("abc".to_string()));
        assert_eq!(extract_token(&headers("Basic abc")), None);
        assert_eq!(extract_token(&headers("Token")), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_field_errors_become_details() {
        let mut errors = FieldErrors::new();
        errors.add("tags", "This list may not be empty.");
        let err = ApiError::from(errors);
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(
            err.error.details,
            Some(serde_json::json!({"tags": ["This list may not be empty."]}))
        );
    }
}
