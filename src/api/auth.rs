//! Authentication API endpoints
//!
//! Handles HTTP requests for token authentication:
//! - POST /api/auth/token/login - Exchange email + password for a token
//! - POST /api/auth/token/logout - Revoke the presented token

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::ApiJson;
use crate::api::middleware::{ApiError, AppState, SessionToken};
use crate::api::permissions::{enforce, ALLOW_ANY, AUTHENTICATED};
use crate::services::LoginInput;

/// Request body for token login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Response for a successful login
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

/// Build the auth router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/token/login",
            post(login).route_layer(from_fn_with_state(ALLOW_ANY, enforce)),
        )
        .route(
            "/auth/token/logout",
            post(logout).route_layer(from_fn_with_state(AUTHENTICATED, enforce)),
        )
}

/// POST /api/auth/token/login
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let session = state
        .user_service
        .login(LoginInput::new(body.email, body.password))
        .await?;

    Ok(Json(TokenResponse {
        auth_token: session.id,
    }))
}

/// POST /api/auth/token/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<StatusCode, ApiError> {
    state.user_service.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
