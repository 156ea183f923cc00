//! Route permissions
//!
//! Each route declares an ordered list of named predicates. The request-level
//! check runs as a route layer; the object-level check runs in handlers once
//! the target row is loaded.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::api::middleware::{ApiError, AuthenticatedUser};
use crate::models::User;

/// A named access predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Anyone, authenticated or not
    AllowAny,
    /// Any authenticated caller
    IsAuthenticated,
    /// Reads for anyone; writes need authentication, and object writes need authorship
    IsAuthorOrReadOnly,
}

pub const ALLOW_ANY: &[Permission] = &[Permission::AllowAny];
pub const AUTHENTICATED: &[Permission] = &[Permission::IsAuthenticated];
pub const AUTHOR_OR_READ_ONLY: &[Permission] = &[Permission::IsAuthorOrReadOnly];

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

impl Permission {
    /// Request-level check
    pub fn has_permission(self, method: &Method, caller: Option<&User>) -> bool {
        match self {
            Permission::AllowAny => true,
            Permission::IsAuthenticated => caller.is_some(),
            Permission::IsAuthorOrReadOnly => is_safe(method) || caller.is_some(),
        }
    }

    /// Object-level check against the row's author
    pub fn has_object_permission(self, method: &Method, caller: Option<&User>, author_id: i64) -> bool {
        match self {
            Permission::AllowAny => true,
            Permission::IsAuthenticated => caller.is_some(),
            Permission::IsAuthorOrReadOnly => {
                is_safe(method) || caller.is_some_and(|u| u.owns(author_id))
            }
        }
    }
}

fn denied(caller: Option<&User>) -> ApiError {
    match caller {
        None => ApiError::unauthorized("Authentication credentials were not provided."),
        Some(_) => ApiError::forbidden("You do not have permission to perform this action."),
    }
}

/// Evaluate request-level predicates in order; the first failure decides the error
pub fn check(permissions: &[Permission], method: &Method, caller: Option<&User>) -> Result<(), ApiError> {
    match permissions.iter().find(|p| !p.has_permission(method, caller)) {
        Some(_) => Err(denied(caller)),
        None => Ok(()),
    }
}

/// Evaluate object-level predicates in order
pub fn check_object(
    permissions: &[Permission],
    method: &Method,
    caller: Option<&User>,
    author_id: i64,
) -> Result<(), ApiError> {
    match permissions
        .iter()
        .find(|p| !p.has_object_permission(method, caller, author_id))
    {
        Some(_) => Err(denied(caller)),
        None => Ok(()),
    }
}

/// Route layer enforcing a predicate list.
///
/// Use with `axum::middleware::from_fn_with_state(PERMISSIONS, enforce)`.
pub async fn enforce(
    State(permissions): State<&'static [Permission]>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|au| &au.0);
    check(permissions, request.method(), caller)?;
    Ok(next.run(request).await)
}
