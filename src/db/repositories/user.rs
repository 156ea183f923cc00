//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{DynDatabasePool, LastInsertId};
use crate::models::{ListParams, User};
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, password_hash, avatar, created_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its generated id
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (the login identifier)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// List users ordered by id
    async fn list(&self, params: &ListParams) -> Result<Vec<User>>;

    /// Count all users
    async fn count(&self) -> Result<i64>;

    /// Replace the password hash
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    /// Set or clear the avatar path
    async fn update_avatar(&self, id: i64, avatar: Option<&str>) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by_column(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let user = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(&sql)
                .bind(value)
                .fetch_optional(p)
                .await
                .with_context(|| format!("Failed to get user by {}", column))?
        });
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let id = on_pool!(self.pool, |p| {
            sqlx::query(
                r#"
                INSERT INTO users (email, username, first_name, last_name, password_hash, avatar, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(&user.avatar)
            .bind(user.created_at)
            .execute(p)
            .await
            .context("Failed to create user")?
            .last_id()
        });

        Ok(User {
            id,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get user by ID")?
        });
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_by_column("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_by_column("username", username).await
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let users = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(p)
                .await
                .context("Failed to list users")?
        });
        Ok(users)
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(p)
                .await
                .context("Failed to count users")?
        });
        Ok(count)
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        on_pool!(self.pool, |p| {
            sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
                .bind(password_hash)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update password")?;
        });
        Ok(())
    }

    async fn update_avatar(&self, id: i64, avatar: Option<&str>) -> Result<()> {
        on_pool!(self.pool, |p| {
            sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
                .bind(avatar)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update avatar")?;
        });
        Ok(())
    }
}
