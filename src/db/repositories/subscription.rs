//! Subscription repository
//!
//! Database operations for follow edges between users.

use crate::db::{DynDatabasePool, LastInsertId};
use crate::models::{ListParams, PagedResult, Subscription, User};
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Create a follow edge `user_id -> author_id`
    async fn create(&self, user_id: i64, author_id: i64) -> Result<Subscription>;

    /// Get the edge `user_id -> author_id`
    async fn get(&self, user_id: i64, author_id: i64) -> Result<Option<Subscription>>;

    /// Delete the edge `user_id -> author_id`. Returns whether a row was removed.
    async fn delete(&self, user_id: i64, author_id: i64) -> Result<bool>;

    /// Check whether `user_id` follows `author_id`
    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool>;

    /// Page of the authors a user follows, ordered by username
    async fn list_authors(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<User>>;
}

/// SQLx-based subscription repository implementation
pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    /// Create a new SQLx subscription repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, user_id: i64, author_id: i64) -> Result<Subscription> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |p| {
            sqlx::query(
                "INSERT INTO subscriptions (user_id, author_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(author_id)
            .bind(now)
            .execute(p)
            .await
            .context("Failed to create subscription")?
            .last_id()
        });

        Ok(Subscription {
            id,
            user_id,
            author_id,
            created_at: now,
        })
    }

    async fn get(&self, user_id: i64, author_id: i64) -> Result<Option<Subscription>> {
        let subscription = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Subscription>(
                "SELECT id, user_id, author_id, created_at FROM subscriptions \
                 WHERE user_id = ? AND author_id = ?",
            )
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(p)
            .await
            .context("Failed to get subscription")?
        });
        Ok(subscription)
    }

    async fn delete(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let removed = on_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND author_id = ?")
                .bind(user_id)
                .bind(author_id)
                .execute(p)
                .await
                .context("Failed to delete subscription")?
                .rows_affected()
        });
        Ok(removed > 0)
    }

    async fn exists(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let count = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM subscriptions WHERE user_id = ? AND author_id = ?",
            )
            .bind(user_id)
            .bind(author_id)
            .fetch_one(p)
            .await
            .context("Failed to check subscription")?
        });
        Ok(count > 0)
    }

    async fn list_authors(&self, user_id: i64, params: &ListParams) -> Result<PagedResult<User>> {
        let total = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(p)
                .await
                .context("Failed to count subscriptions")?
        });

        let authors = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(
                r#"
                SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                       u.password_hash, u.avatar, u.created_at
                FROM subscriptions s
                INNER JOIN users u ON u.id = s.author_id
                WHERE s.user_id = ?
                ORDER BY u.username
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(user_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(p)
            .await
            .context("Failed to list subscriptions")?
        });

        Ok(PagedResult::new(authors, total, params))
    }
}
