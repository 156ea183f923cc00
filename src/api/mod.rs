//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP endpoints of the Foodgram backend.
//! It includes:
//! - Auth token endpoints
//! - User, avatar and subscription endpoints
//! - Tag and ingredient reference data endpoints
//! - Recipe, favorite, shopping cart and short-link endpoints
//! - Static media serving

pub mod auth;
pub mod common;
pub mod ingredients;
pub mod middleware;
pub mod permissions;
pub mod recipes;
pub mod responses;
pub mod short_links;
pub mod tags;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower::Layer;
use tower_http::{
    cors::CorsLayer,
    normalize_path::{NormalizePath, NormalizePathLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(tags::router())
        .merge(ingredients::router())
        .merge(recipes::router())
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let media = ServeDir::new(state.images.root());

    Ok(Router::new()
        .nest("/api", build_api_router(state.clone()))
        .route("/r/{code}", get(short_links::resolve_short_link))
        .nest_service("/media", media)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Wrap the router so that trailing slashes are ignored.
///
/// Path normalisation has to run before routing, so it wraps the router
/// instead of being added as a router layer.
pub fn build_app(state: AppState) -> anyhow::Result<NormalizePath<Router>> {
    Ok(NormalizePathLayer::trim_trailing_slash().layer(build_router(state)?))
}
