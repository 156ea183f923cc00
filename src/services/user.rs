//! User service
//!
//! Implements business logic for user accounts and authentication:
//! - Registration with per-field validation
//! - Token login / logout backed by sessions
//! - Password changes (which revoke every session)
//! - Avatar upload and removal

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, SubscriptionRepository, UserRepository};
use crate::models::{
    is_valid_email, is_valid_username, ListParams, PagedResult, Session, User, EMAIL_MAX_LEN,
    NAME_MAX_LEN,
};
use crate::services::image::{ImageError, ImageKind, ImageStore};
use crate::services::password::{hash_password, password_problems, verify_password};
use crate::services::subscription::is_subscribed;
use crate::services::validation::{require_text, FieldErrors, NON_FIELD_ERRORS};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime in days
const DEFAULT_SESSION_DAYS: i64 = 30;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid input, reported per field
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    /// User not found
    #[error("User not found: {0}")]
    NotFound(i64),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for UserServiceError {
    fn from(errors: FieldErrors) -> Self {
        UserServiceError::ValidationError(errors)
    }
}

/// A user as seen by a particular caller
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: User,
    /// Whether the caller follows this user
    pub is_subscribed: bool,
}

/// Input for user registration
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

/// Input for token login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// User service for accounts and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    images: Arc<ImageStore>,
    session_days: i64,
}

impl UserService {
    /// Create a new user service with the default session lifetime
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        images: Arc<ImageStore>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            subscription_repo,
            images,
            session_days: DEFAULT_SESSION_DAYS,
        }
    }

    /// Override how many days a login session stays valid
    pub fn with_session_days(mut self, days: i64) -> Self {
        self.session_days = days;
        self
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// - `ValidationError` for missing/invalid fields, weak passwords, or a
    ///   taken email / username
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();

        let email = require_text(&mut errors, "email", input.email.as_deref(), Some(EMAIL_MAX_LEN));
        if let Some(ref email) = email {
            if !is_valid_email(email) {
                errors.add("email", "Enter a valid email address.");
            }
        }

        let username = require_text(
            &mut errors,
            "username",
            input.username.as_deref(),
            Some(NAME_MAX_LEN),
        );
        if let Some(ref username) = username {
            if !is_valid_username(username) {
                errors.add(
                    "username",
                    "Enter a valid username. It may contain only letters, digits and @/./+/-/_ characters.",
                );
            }
        }

        let first_name = require_text(
            &mut errors,
            "first_name",
            input.first_name.as_deref(),
            Some(NAME_MAX_LEN),
        );
        let last_name = require_text(
            &mut errors,
            "last_name",
            input.last_name.as_deref(),
            Some(NAME_MAX_LEN),
        );

        let password = input.password.unwrap_or_default();
        if password.is_empty() {
            errors.add("password", "This field is required.");
        } else {
            let personal: Vec<&str> = [&email, &username, &first_name, &last_name]
                .into_iter()
                .filter_map(|v| v.as_deref())
                .collect();
            for problem in password_problems(&password, &personal) {
                errors.add("password", problem);
            }
        }

        if let Some(ref email) = email {
            if !errors.has("email")
                && self
                    .user_repo
                    .get_by_email(email)
                    .await
                    .context("Failed to check email")?
                    .is_some()
            {
                errors.add("email", "A user with that email already exists.");
            }
        }
        if let Some(ref username) = username {
            if !errors.has("username")
                && self
                    .user_repo
                    .get_by_username(username)
                    .await
                    .context("Failed to check username")?
                    .is_some()
            {
                errors.add("username", "A user with that username already exists.");
            }
        }

        errors.into_result()?;
        let (Some(email), Some(username), Some(first_name), Some(last_name)) =
            (email, username, first_name, last_name)
        else {
            return Err(anyhow::anyhow!("Registration fields missing after validation").into());
        };

        let password_hash = hash_password(&password).context("Failed to hash password")?;
        let user = User::new(email, username, first_name, last_name, password_hash);

        match self.user_repo.create(&user).await {
            Ok(created) => {
                tracing::info!("Registered user {} ({})", created.username, created.id);
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(FieldErrors::single(
                NON_FIELD_ERRORS,
                "A user with that username or email already exists.",
            )
            .into()),
            Err(e) => Err(e.context("Failed to create user").into()),
        }
    }

    /// Exchange email + password for a new session
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the credentials are invalid
    /// - `InternalError` for database errors
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid =
            || FieldErrors::single(NON_FIELD_ERRORS, "Unable to log in with provided credentials.");

        let user = self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            tracing::debug!("Rejected login for user {}", user.id);
            return Err(invalid().into());
        }

        self.create_session(user.id).await
    }

    /// Invalidate a session token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown or expired tokens; expired ones are deleted.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    /// Get a user by ID
    pub async fn get(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound(id))
    }

    /// Page of users ordered by id
    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let users = self.user_repo.list(params).await.context("Failed to list users")?;
        let total = self.user_repo.count().await.context("Failed to count users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Attach the caller-relative subscription flag to a user
    pub async fn profile(
        &self,
        user: User,
        viewer: Option<i64>,
    ) -> Result<UserProfile, UserServiceError> {
        let is_subscribed = is_subscribed(viewer, user.id, self.subscription_repo.as_ref())
            .await
            .context("Failed to check subscription")?;
        Ok(UserProfile { user, is_subscribed })
    }

    /// Change the password after checking the current one; revokes all sessions
    pub async fn set_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        let mut errors = FieldErrors::new();

        if current_password.is_empty() {
            errors.add("current_password", "This field is required.");
        } else if !verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            errors.add("current_password", "Invalid password.");
        }

        if new_password.is_empty() {
            errors.add("new_password", "This field is required.");
        } else {
            let personal = [
                user.username.as_str(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
            ];
            for problem in password_problems(new_password, &personal) {
                errors.add("new_password", problem);
            }
        }
        errors.into_result()?;

        let password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user.id, &password_hash)
            .await
            .context("Failed to update password")?;
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to revoke sessions")?;

        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    /// Store a new avatar from a data URI and return the updated user
    pub async fn set_avatar(&self, user: &User, data_uri: Option<&str>) -> Result<User, UserServiceError> {
        let data_uri = data_uri.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            FieldErrors::single("avatar", "This field is required.")
        })?;

        let stored = self
            .images
            .save(ImageKind::Avatar, data_uri)
            .await
            .map_err(|e| image_error("avatar", e))?;

        if let Err(e) = self.user_repo.update_avatar(user.id, Some(&stored)).await {
            self.images.remove(&stored).await;
            return Err(e.context("Failed to update avatar").into());
        }

        if let Some(ref old) = user.avatar {
            self.images.remove(old).await;
        }

        Ok(User {
            avatar: Some(stored),
            ..user.clone()
        })
    }

    /// Clear the avatar and delete its file
    pub async fn delete_avatar(&self, user: &User) -> Result<(), UserServiceError> {
        self.user_repo
            .update_avatar(user.id, None)
            .await
            .context("Failed to clear avatar")?;
        if let Some(ref old) = user.avatar {
            self.images.remove(old).await;
        }
        Ok(())
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

/// Map an image failure onto a field error, or an internal error for I/O
fn image_error(field: &str, err: ImageError) -> UserServiceError {
    if err.is_client_error() {
        FieldErrors::single(field, err.to_string()).into()
    } else {
        UserServiceError::InternalError(anyhow::Error::new(err).context("Failed to store image"))
    }
}
