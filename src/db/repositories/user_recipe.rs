//! Favorites and shopping-cart repository
//!
//! Both sets are plain (user, recipe) join tables, so a single repository
//! serves them, keyed by [`RecipeRelation`].

use crate::db::DynDatabasePool;
use crate::models::RecipeRelation;
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Repository for per-user recipe sets
#[async_trait]
pub trait UserRecipeRepository: Send + Sync {
    /// Add a recipe to a user's set. Fails with a unique violation if present.
    async fn add(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<()>;

    /// Remove a recipe from a user's set. Returns whether a row was removed.
    async fn remove(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<bool>;

    /// Check whether a recipe is in a user's set
    async fn exists(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<bool>;
}

/// SQLx-based implementation
pub struct SqlxUserRecipeRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRecipeRepository {
    /// Create a new repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRecipeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRecipeRepository for SqlxUserRecipeRepository {
    async fn add(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, recipe_id, created_at) VALUES (?, ?, ?)",
            relation.table()
        );
        let now = Utc::now();
        on_pool!(self.pool, |p| {
            sqlx::query(&sql)
                .bind(user_id)
                .bind(recipe_id)
                .bind(now)
                .execute(p)
                .await
                .with_context(|| format!("Failed to add recipe to {}", relation.label()))?;
        });
        Ok(())
    }

    async fn remove(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ? AND recipe_id = ?",
            relation.table()
        );
        let removed = on_pool!(self.pool, |p| {
            sqlx::query(&sql)
                .bind(user_id)
                .bind(recipe_id)
                .execute(p)
                .await
                .with_context(|| format!("Failed to remove recipe from {}", relation.label()))?
                .rows_affected()
        });
        Ok(removed > 0)
    }

    async fn exists(&self, relation: RecipeRelation, user_id: i64, recipe_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = ? AND recipe_id = ?",
            relation.table()
        );
        let count = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(user_id)
                .bind(recipe_id)
                .fetch_one(p)
                .await
                .with_context(|| format!("Failed to check {}", relation.label()))?
        });
        Ok(count > 0)
    }
}
