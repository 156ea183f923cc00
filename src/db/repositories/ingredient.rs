//! Ingredient repository
//!
//! Database operations for ingredient reference data, recipe ingredient rows
//! and the shopping-cart aggregation.
//!
//! Names are searched through `name_lower`, written here with Unicode
//! lowercasing, because SQLite's `LIKE` only folds ASCII letters.

use crate::config::DatabaseDriver;
use crate::db::{placeholders, DynDatabasePool, LastInsertId};
use crate::models::{Amount, Ingredient, IngredientTotal, RecipeIngredient};
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Escape character used in LIKE patterns; portable across SQLite and MySQL
const LIKE_ESCAPE: char = '!';

/// Ingredient repository trait
#[async_trait]
pub trait IngredientRepository: Send + Sync {
    /// Create an ingredient
    async fn create(&self, name: &str, measurement_unit: &str) -> Result<Ingredient>;

    /// Insert a (name, unit) pair unless it already exists. Returns whether a row was inserted.
    async fn create_if_absent(&self, name: &str, measurement_unit: &str) -> Result<bool>;

    /// Get ingredient by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Ingredient>>;

    /// Get all ingredients whose id is in `ids`
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Ingredient>>;

    /// List ingredients ordered by name, optionally restricted to a name prefix
    async fn list(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>>;

    /// Ingredients of a recipe with their amounts
    async fn list_for_recipe(&self, recipe_id: i64) -> Result<Vec<RecipeIngredient>>;

    /// Sum of every ingredient across the recipes in a user's shopping cart
    async fn cart_totals(&self, user_id: i64) -> Result<Vec<IngredientTotal>>;
}

/// SQLx-based ingredient repository implementation
pub struct SqlxIngredientRepository {
    pool: DynDatabasePool,
}

impl SqlxIngredientRepository {
    /// Create a new SQLx ingredient repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn IngredientRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct RecipeIngredientRow {
    id: i64,
    name: String,
    measurement_unit: String,
    amount_hundredths: i64,
}

impl From<RecipeIngredientRow> for RecipeIngredient {
    fn from(row: RecipeIngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            measurement_unit: row.measurement_unit,
            amount: Amount::from_hundredths(row.amount_hundredths),
        }
    }
}

#[derive(sqlx::FromRow)]
struct IngredientTotalRow {
    name: String,
    measurement_unit: String,
    total_hundredths: i64,
}

impl From<IngredientTotalRow> for IngredientTotal {
    fn from(row: IngredientTotalRow) -> Self {
        Self {
            name: row.name,
            measurement_unit: row.measurement_unit,
            total: Amount::from_hundredths(row.total_hundredths),
        }
    }
}

/// Build a `LIKE` pattern matching lowercased values that start with `prefix`
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.to_lowercase().chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl IngredientRepository for SqlxIngredientRepository {
    async fn create(&self, name: &str, measurement_unit: &str) -> Result<Ingredient> {
        let id = on_pool!(self.pool, |p| {
            sqlx::query(
                "INSERT INTO ingredients (name, name_lower, measurement_unit) VALUES (?, ?, ?)",
            )
            .bind(name)
            .bind(name.to_lowercase())
            .bind(measurement_unit)
            .execute(p)
            .await
            .context("Failed to create ingredient")?
            .last_id()
        });

        Ok(Ingredient {
            id,
            name: name.to_string(),
            measurement_unit: measurement_unit.to_string(),
        })
    }

    async fn create_if_absent(&self, name: &str, measurement_unit: &str) -> Result<bool> {
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                "INSERT OR IGNORE INTO ingredients (name, name_lower, measurement_unit) VALUES (?, ?, ?)"
            }
            DatabaseDriver::Mysql => {
                "INSERT IGNORE INTO ingredients (name, name_lower, measurement_unit) VALUES (?, ?, ?)"
            }
        };
        let inserted = on_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(name)
                .bind(name.to_lowercase())
                .bind(measurement_unit)
                .execute(p)
                .await
                .context("Failed to insert ingredient")?
                .rows_affected()
        });
        Ok(inserted > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Ingredient>> {
        let ingredient = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Ingredient>(
                "SELECT id, name, measurement_unit FROM ingredients WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(p)
            .await
            .context("Failed to get ingredient by ID")?
        });
        Ok(ingredient)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Ingredient>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, measurement_unit FROM ingredients WHERE id IN ({})",
            placeholders(ids.len())
        );
        let ingredients = on_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, Ingredient>(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query
                .fetch_all(p)
                .await
                .context("Failed to get ingredients by IDs")?
        });
        Ok(ingredients)
    }

    async fn list(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>> {
        let prefix = name_prefix.map(str::trim).filter(|s| !s.is_empty());
        let ingredients = match prefix {
            Some(prefix) => {
                let pattern = prefix_pattern(prefix);
                let sql = format!(
                    "SELECT id, name, measurement_unit FROM ingredients \
                     WHERE name_lower LIKE ? ESCAPE '{}' ORDER BY name, id",
                    LIKE_ESCAPE
                );
                on_pool!(self.pool, |p| {
                    sqlx::query_as::<_, Ingredient>(&sql)
                        .bind(&pattern)
                        .fetch_all(p)
                        .await
                        .context("Failed to search ingredients")?
                })
            }
            None => on_pool!(self.pool, |p| {
                sqlx::query_as::<_, Ingredient>(
                    "SELECT id, name, measurement_unit FROM ingredients ORDER BY name, id",
                )
                .fetch_all(p)
                .await
                .context("Failed to list ingredients")?
            }),
        };
        Ok(ingredients)
    }

    async fn list_for_recipe(&self, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
        let rows = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, RecipeIngredientRow>(
                r#"
                SELECT i.id, i.name, i.measurement_unit, ri.amount_hundredths
                FROM recipe_ingredients ri
                INNER JOIN ingredients i ON i.id = ri.ingredient_id
                WHERE ri.recipe_id = ?
                ORDER BY ri.id
                "#,
            )
            .bind(recipe_id)
            .fetch_all(p)
            .await
            .context("Failed to list recipe ingredients")?
        });
        Ok(rows.into_iter().map(RecipeIngredient::from).collect())
    }

    async fn cart_totals(&self, user_id: i64) -> Result<Vec<IngredientTotal>> {
        // MySQL sums integers into DECIMAL, so the total is cast back per driver.
        const SQLITE: &str = r#"
            SELECT i.name, i.measurement_unit, CAST(SUM(ri.amount_hundredths) AS INTEGER) AS total_hundredths
            FROM shopping_cart sc
            INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE sc.user_id = ?
            GROUP BY i.id, i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit
        "#;
        const MYSQL: &str = r#"
            SELECT i.name, i.measurement_unit, CAST(SUM(ri.amount_hundredths) AS SIGNED) AS total_hundredths
            FROM shopping_cart sc
            INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE sc.user_id = ?
            GROUP BY i.id, i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit
        "#;

        let totals = on_pool!(
            self.pool,
            sqlite |p| {
                sqlx::query_as::<_, IngredientTotalRow>(SQLITE)
                    .bind(user_id)
                    .fetch_all(p)
                    .await
                    .context("Failed to aggregate shopping cart")?
            },
            mysql |p| {
                sqlx::query_as::<_, IngredientTotalRow>(MYSQL)
                    .bind(user_id)
                    .fetch_all(p)
                    .await
                    .context("Failed to aggregate shopping cart")?
            }
        );
        Ok(totals.into_iter().map(IngredientTotal::from).collect())
    }
}
