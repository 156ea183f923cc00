//! User model
//!
//! This module defines the User entity and the field rules shared by
//! registration and profile validation.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of `username`, `first_name` and `last_name`
pub const NAME_MAX_LEN: usize = 150;

/// Maximum length of an email address
pub const EMAIL_MAX_LEN: usize = 254;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

/// User entity representing a registered account.
///
/// The email address is the login identifier; the username is the public
/// handle shown next to recipes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, used to log in)
    pub email: String,
    /// Username (unique)
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Avatar path relative to the media root
    pub avatar: Option<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this function.
    /// Use `services::password::hash_password()` to hash the password.
    pub fn new(
        email: String,
        username: String,
        first_name: String,
        last_name: String,
        password_hash: String,
    ) -> Self {
        Self {
            id: 0, // Will be set by the database
            email,
            username,
            first_name,
            last_name,
            password_hash,
            avatar: None,
            created_at: Utc::now(),
        }
    }

    /// Check if this user is the author of a recipe (or any owned row)
    pub fn owns(&self, author_id: i64) -> bool {
        self.id == author_id
    }
}

/// Check a username against the allowed character set
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && username.chars().count() <= NAME_MAX_LEN && USERNAME_RE.is_match(username)
}

/// Minimal structural email check: one `@` with text on both sides and a dot in the domain
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
