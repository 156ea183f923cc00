//! Tag repository
//!
//! Database operations for tags and recipe-tag links.

use crate::config::DatabaseDriver;
use crate::db::{placeholders, DynDatabasePool, LastInsertId};
use crate::models::Tag;
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a tag
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    /// Insert a tag unless the name or slug is taken. Returns whether a row was inserted.
    async fn create_if_absent(&self, name: &str, slug: &str) -> Result<bool>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get all tags whose id is in `ids`
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>>;

    /// List all tags ordered by name
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Tags attached to a recipe, ordered by name
    async fn list_for_recipe(&self, recipe_id: i64) -> Result<Vec<Tag>>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        let id = on_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO tags (name, slug) VALUES (?, ?)")
                .bind(name)
                .bind(slug)
                .execute(p)
                .await
                .context("Failed to create tag")?
                .last_id()
        });

        Ok(Tag {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
        })
    }

    async fn create_if_absent(&self, name: &str, slug: &str) -> Result<bool> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => "INSERT OR IGNORE INTO tags (name, slug) VALUES (?, ?)",
            DatabaseDriver::Mysql => "INSERT IGNORE INTO tags (name, slug) VALUES (?, ?)",
        };
        let inserted = on_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(name)
                .bind(slug)
                .execute(p)
                .await
                .context("Failed to insert tag")?
                .rows_affected()
        });
        Ok(inserted > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let tag = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get tag by ID")?
        });
        Ok(tag)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, slug FROM tags WHERE id IN ({}) ORDER BY name",
            placeholders(ids.len())
        );
        let tags = on_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, Tag>(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query.fetch_all(p).await.context("Failed to get tags by IDs")?
        });
        Ok(tags)
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let tags = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Tag>("SELECT id, name, slug FROM tags ORDER BY name")
                .fetch_all(p)
                .await
                .context("Failed to list tags")?
        });
        Ok(tags)
    }

    async fn list_for_recipe(&self, recipe_id: i64) -> Result<Vec<Tag>> {
        let tags = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Tag>(
                r#"
                SELECT t.id, t.name, t.slug
                FROM tags t
                INNER JOIN recipe_tags rt ON rt.tag_id = t.id
                WHERE rt.recipe_id = ?
                ORDER BY t.name
                "#,
            )
            .bind(recipe_id)
            .fetch_all(p)
            .await
            .context("Failed to list tags for recipe")?
        });
        Ok(tags)
    }
}
