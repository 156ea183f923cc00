//! Recipe repository
//!
//! Database operations for recipes and their tag / ingredient join rows.
//!
//! This module provides:
//! - `RecipeRepository` trait defining the interface for recipe data access
//! - `SqlxRecipeRepository` implementing the trait for SQLite and MySQL
//!
//! Writes that touch join rows run inside a single transaction: the recipe
//! row and its full tag and ingredient sets are either all stored or none.

use crate::db::{placeholders, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, NewRecipe, PagedResult, Recipe, RecipeChanges, RecipeFilter};
use crate::on_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const RECIPE_COLUMNS: &str =
    "r.id, r.author_id, r.name, r.text, r.cooking_time, r.image, r.short_code, r.created_at";

/// Recipe repository trait
#[async_trait]
pub trait RecipeRepository: Send + Sync {
    /// Insert a recipe with its tags and ingredients
    async fn create(&self, recipe: &NewRecipe) -> Result<Recipe>;

    /// Get recipe by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Recipe>>;

    /// Get recipe by short-link code
    async fn get_by_short_code(&self, code: &str) -> Result<Option<Recipe>>;

    /// Check whether a short code is already taken
    async fn short_code_exists(&self, code: &str) -> Result<bool>;

    /// Replace a recipe's fields and its full tag / ingredient sets
    async fn update(&self, id: i64, changes: &RecipeChanges) -> Result<Recipe>;

    /// Delete a recipe. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Filtered page of recipes, newest first.
    ///
    /// `viewer` is the caller the favorite / cart filters refer to; those
    /// filters are ignored when it is `None`.
    async fn list(
        &self,
        filter: &RecipeFilter,
        viewer: Option<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<Recipe>>;

    /// Recipes of one author, newest first, optionally truncated
    async fn list_by_author(&self, author_id: i64, limit: Option<u32>) -> Result<Vec<Recipe>>;

    /// Number of recipes of one author
    async fn count_by_author(&self, author_id: i64) -> Result<i64>;
}

/// SQLx-based recipe repository implementation
pub struct SqlxRecipeRepository {
    pool: DynDatabasePool,
}

impl SqlxRecipeRepository {
    /// Create a new SQLx recipe repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RecipeRepository> {
        Arc::new(Self::new(pool))
    }
}

/// A value bound into a dynamically built query
#[derive(Debug, Clone, PartialEq, Eq)]
enum Bind {
    Int(i64),
    Text(String),
}

/// Build the `WHERE` clause (possibly empty) and its bind values for a filter
fn filter_clause(filter: &RecipeFilter, viewer: Option<i64>) -> (String, Vec<Bind>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(author) = filter.author {
        conditions.push("r.author_id = ?".to_string());
        binds.push(Bind::Int(author));
    }

    if !filter.tags.is_empty() {
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
             WHERE rt.recipe_id = r.id AND t.slug IN ({}))",
            placeholders(filter.tags.len())
        ));
        binds.extend(filter.tags.iter().cloned().map(Bind::Text));
    }

    if let Some(user_id) = viewer {
        let relations = [
            ("favorites", filter.is_favorited),
            ("shopping_cart", filter.is_in_shopping_cart),
        ];
        for (table, wanted) in relations {
            if let Some(wanted) = wanted {
                let negation = if wanted { "" } else { "NOT " };
                conditions.push(format!(
                    "{}EXISTS (SELECT 1 FROM {} x WHERE x.recipe_id = r.id AND x.user_id = ?)",
                    negation, table
                ));
                binds.push(Bind::Int(user_id));
            }
        }
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

#[async_trait]
impl RecipeRepository for SqlxRecipeRepository {
    async fn create(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Utc::now();
        let id = on_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;

            let id = sqlx::query(
                r#"
                INSERT INTO recipes (author_id, name, text, cooking_time, image, short_code, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(recipe.author_id)
            .bind(&recipe.name)
            .bind(&recipe.text)
            .bind(recipe.cooking_time)
            .bind(&recipe.image)
            .bind(&recipe.short_code)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create recipe")?
            .last_id();

            for tag_id in &recipe.tags {
                sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link recipe tag")?;
            }

            for item in &recipe.ingredients {
                sqlx::query(
                    "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount_hundredths) VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(item.id)
                .bind(item.amount.hundredths())
                .execute(&mut *tx)
                .await
                .context("Failed to add recipe ingredient")?;
            }

            tx.commit().await.context("Failed to commit recipe")?;
            id
        });

        Ok(Recipe {
            id,
            author_id: recipe.author_id,
            name: recipe.name.clone(),
            text: recipe.text.clone(),
            cooking_time: recipe.cooking_time,
            image: recipe.image.clone(),
            short_code: recipe.short_code.clone(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        let sql = format!("SELECT {} FROM recipes r WHERE r.id = ?", RECIPE_COLUMNS);
        let recipe = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Recipe>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get recipe by ID")?
        });
        Ok(recipe)
    }

    async fn get_by_short_code(&self, code: &str) -> Result<Option<Recipe>> {
        let sql = format!(
            "SELECT {} FROM recipes r WHERE r.short_code = ?",
            RECIPE_COLUMNS
        );
        let recipe = on_pool!(self.pool, |p| {
            sqlx::query_as::<_, Recipe>(&sql)
                .bind(code)
                .fetch_optional(p)
                .await
                .context("Failed to get recipe by short code")?
        });
        Ok(recipe)
    }

    async fn short_code_exists(&self, code: &str) -> Result<bool> {
        let count = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE short_code = ?")
                .bind(code)
                .fetch_one(p)
                .await
                .context("Failed to check short code")?
        });
        Ok(count > 0)
    }

    async fn update(&self, id: i64, changes: &RecipeChanges) -> Result<Recipe> {
        on_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;

            sqlx::query(
                "UPDATE recipes SET name = ?, text = ?, cooking_time = ?, image = ? WHERE id = ?",
            )
            .bind(&changes.name)
            .bind(&changes.text)
            .bind(changes.cooking_time)
            .bind(&changes.image)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update recipe")?;

            sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear recipe tags")?;
            for tag_id in &changes.tags {
                sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link recipe tag")?;
            }

            sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear recipe ingredients")?;
            for item in &changes.ingredients {
                sqlx::query(
                    "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount_hundredths) VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(item.id)
                .bind(item.amount.hundredths())
                .execute(&mut *tx)
                .await
                .context("Failed to add recipe ingredient")?;
            }

            tx.commit().await.context("Failed to commit recipe update")?;
        });

        self.get_by_id(id)
            .await?
            .with_context(|| format!("Recipe {} vanished during update", id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let removed = on_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM recipes WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete recipe")?
                .rows_affected()
        });
        Ok(removed > 0)
    }

    async fn list(
        &self,
        filter: &RecipeFilter,
        viewer: Option<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<Recipe>> {
        let (where_clause, binds) = filter_clause(filter, viewer);
        let count_sql = format!("SELECT COUNT(*) FROM recipes r{}", where_clause);
        let list_sql = format!(
            "SELECT {} FROM recipes r{} ORDER BY r.id DESC LIMIT ? OFFSET ?",
            RECIPE_COLUMNS, where_clause
        );

        let total = on_pool!(self.pool, |p| {
            let mut query = sqlx::query_scalar::<_, i64>(&count_sql);
            for bind in &binds {
                query = match bind {
                    Bind::Int(v) => query.bind(*v),
                    Bind::Text(s) => query.bind(s.as_str()),
                };
            }
            query.fetch_one(p).await.context("Failed to count recipes")?
        });

        let recipes = on_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, Recipe>(&list_sql);
            for bind in &binds {
                query = match bind {
                    Bind::Int(v) => query.bind(*v),
                    Bind::Text(s) => query.bind(s.as_str()),
                };
            }
            query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(p)
                .await
                .context("Failed to list recipes")?
        });

        Ok(PagedResult::new(recipes, total, params))
    }

    async fn list_by_author(&self, author_id: i64, limit: Option<u32>) -> Result<Vec<Recipe>> {
        let mut sql = format!(
            "SELECT {} FROM recipes r WHERE r.author_id = ? ORDER BY r.id DESC",
            RECIPE_COLUMNS
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        let recipes = on_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, Recipe>(&sql).bind(author_id);
            if let Some(limit) = limit {
                query = query.bind(i64::from(limit));
            }
            query
                .fetch_all(p)
                .await
                .context("Failed to list recipes by author")?
        });
        Ok(recipes)
    }

    async fn count_by_author(&self, author_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, |p| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes WHERE author_id = ?")
                .bind(author_id)
                .fetch_one(p)
                .await
                .context("Failed to count recipes by author")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        IngredientRepository, SqlxIngredientRepository, SqlxTagRepository, SqlxUserRepository,
        TagRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Amount, IngredientAmount, User};

    struct Fixture {
        pool: DynDatabasePool,
        repo: SqlxRecipeRepository,
        author: i64,
        tags: Vec<i64>,
        ingredients: Vec<i64>,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let author = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "chef@example.com".to_string(),
                "chef".to_string(),
                "Chef".to_string(),
                "Cook".to_string(),
                "hash".to_string(),
            ))
            .await
            .expect("Failed to create user")
            .id;

        let tag_repo = SqlxTagRepository::new(pool.clone());
        let mut tags = Vec::new();
        for (name, slug) in [("Breakfast", "breakfast"), ("Lunch", "lunch")] {
            tags.push(tag_repo.create(name, slug).await.expect("tag").id);
        }

        let ingredient_repo = SqlxIngredientRepository::new(pool.clone());
        let mut ingredients = Vec::new();
        for (name, unit) in [("flour", "g"), ("egg", "pcs"), ("milk", "ml")] {
            ingredients.push(ingredient_repo.create(name, unit).await.expect("ingredient").id);
        }

        Fixture {
            repo: SqlxRecipeRepository::new(pool.clone()),
            pool,
            author,
            tags,
            ingredients,
        }
    }

    fn units(n: i64) -> Amount {
        Amount::from_hundredths(n * 100)
    }

    fn new_recipe(fx: &Fixture, code: &str, tags: Vec<i64>) -> NewRecipe {
        NewRecipe {
            author_id: fx.author,
            name: format!("Recipe {}", code),
            text: "Mix and bake".to_string(),
            cooking_time: 30,
            image: "recipes/images/a.png".to_string(),
            short_code: code.to_string(),
            tags,
            ingredients: vec![
                IngredientAmount { id: fx.ingredients[0], amount: units(200) },
                IngredientAmount { id: fx.ingredients[1], amount: units(2) },
            ],
        }
    }

    async fn recipe_ingredients(fx: &Fixture, recipe_id: i64) -> Vec<(i64, Amount)> {
        let mut rows: Vec<_> = SqlxIngredientRepository::new(fx.pool.clone())
            .list_for_recipe(recipe_id)
            .await
            .expect("ingredients")
            .into_iter()
            .map(|i| (i.id, i.amount))
            .collect();
        rows.sort();
        rows
    }

    #[tokio::test]
    async fn test_create_stores_joins() {
        let fx = setup().await;
        let recipe = fx
            .repo
            .create(&new_recipe(&fx, "AAAAAAAAAA", fx.tags.clone()))
            .await
            .expect("Failed to create recipe");

        let loaded = fx.repo.get_by_id(recipe.id).await.unwrap().expect("missing");
        assert_eq!(loaded.name, recipe.name);
        assert_eq!(loaded.short_code, "AAAAAAAAAA");

        let tags = SqlxTagRepository::new(fx.pool.clone())
            .list_for_recipe(recipe.id)
            .await
            .unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(
            recipe_ingredients(&fx, recipe.id).await,
            vec![(fx.ingredients[0], units(200)), (fx.ingredients[1], units(2))]
        );
    }

    #[tokio::test]
    async fn test_failed_create_persists_nothing() {
        let fx = setup().await;
        let mut recipe = new_recipe(&fx, "BBBBBBBBBB", fx.tags.clone());
        recipe.ingredients.push(IngredientAmount { id: fx.ingredients[0], amount: units(5) });

        assert!(fx.repo.create(&recipe).await.is_err());

        let page = fx
            .repo
            .list(&RecipeFilter::default(), None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(!fx.repo.short_code_exists("BBBBBBBBBB").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_ingredient_set() {
        let fx = setup().await;
        let recipe = fx
            .repo
            .create(&new_recipe(&fx, "CCCCCCCCCC", vec![fx.tags[0]]))
            .await
            .unwrap();

        let updated = fx
            .repo
            .update(
                recipe.id,
                &RecipeChanges {
                    name: "Pancakes".to_string(),
                    text: "Fry".to_string(),
                    cooking_time: 10,
                    image: recipe.image.clone(),
                    tags: vec![fx.tags[1]],
                    ingredients: vec![
                        IngredientAmount { id: fx.ingredients[1], amount: units(3) },
                        IngredientAmount { id: fx.ingredients[2], amount: units(250) },
                    ],
                },
            )
            .await
            .expect("Failed to update");

        assert_eq!(updated.name, "Pancakes");
        assert_eq!(updated.short_code, "CCCCCCCCCC");
        assert_eq!(
            recipe_ingredients(&fx, recipe.id).await,
            vec![(fx.ingredients[1], units(3)), (fx.ingredients[2], units(250))]
        );
        let tags = SqlxTagRepository::new(fx.pool.clone())
            .list_for_recipe(recipe.id)
            .await
            .unwrap();
        assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![fx.tags[1]]);
    }

    #[tokio::test]
    async fn test_short_code_lookup_and_delete() {
        let fx = setup().await;
        let recipe = fx
            .repo
            .create(&new_recipe(&fx, "DDDDDDDDDD", vec![fx.tags[0]]))
            .await
            .unwrap();

        assert!(fx.repo.short_code_exists("DDDDDDDDDD").await.unwrap());
        let found = fx.repo.get_by_short_code("DDDDDDDDDD").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(recipe.id));

        let duplicate = fx
            .repo
            .create(&new_recipe(&fx, "DDDDDDDDDD", vec![fx.tags[0]]))
            .await
            .expect_err("short codes are unique");
        assert!(crate::db::is_unique_violation(&duplicate));

        assert!(fx.repo.delete(recipe.id).await.unwrap());
        assert!(!fx.repo.delete(recipe.id).await.unwrap());
        assert!(recipe_ingredients(&fx, recipe.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_tag_without_duplicates() {
        let fx = setup().await;
        let both = fx
            .repo
            .create(&new_recipe(&fx, "EEEEEEEEEE", fx.tags.clone()))
            .await
            .unwrap();
        fx.repo
            .create(&new_recipe(&fx, "FFFFFFFFFF", vec![fx.tags[1]]))
            .await
            .unwrap();

        let filter = RecipeFilter {
            tags: vec!["breakfast".to_string(), "lunch".to_string()],
            ..Default::default()
        };
        let page = fx.repo.list(&filter, None, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);

        let filter = RecipeFilter {
            tags: vec!["breakfast".to_string()],
            ..Default::default()
        };
        let page = fx.repo.list(&filter, None, &ListParams::default()).await.unwrap();
        assert_eq!(page.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![both.id]);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_paginated() {
        let fx = setup().await;
        let mut ids = Vec::new();
        for code in ["GGGGGGGGG1", "GGGGGGGGG2", "GGGGGGGGG3"] {
            ids.push(fx.repo.create(&new_recipe(&fx, code, vec![fx.tags[0]])).await.unwrap().id);
        }

        let page = fx
            .repo
            .list(&RecipeFilter::default(), None, &ListParams::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
        assert!(page.has_next());

        let filter = RecipeFilter {
            author: Some(fx.author + 1),
            ..Default::default()
        };
        let page = fx.repo.list(&filter, None, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_by_author_truncates() {
        let fx = setup().await;
        for code in ["HHHHHHHHH1", "HHHHHHHHH2", "HHHHHHHHH3"] {
            fx.repo.create(&new_recipe(&fx, code, vec![fx.tags[0]])).await.unwrap();
        }

        assert_eq!(fx.repo.list_by_author(fx.author, None).await.unwrap().len(), 3);
        let limited = fx.repo.list_by_author(fx.author, Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].short_code, "HHHHHHHHH3");
        assert_eq!(fx.repo.count_by_author(fx.author).await.unwrap(), 3);
    }

    #[test]
    fn test_filter_clause_ignores_relations_for_anonymous() {
        let filter = RecipeFilter {
            is_favorited: Some(true),
            is_in_shopping_cart: Some(false),
            ..Default::default()
        };
        let (clause, binds) = filter_clause(&filter, None);
        assert!(clause.is_empty());
        assert!(binds.is_empty());

        let (clause, binds) = filter_clause(&filter, Some(7));
        assert!(clause.contains("EXISTS (SELECT 1 FROM favorites"));
        assert!(clause.contains("NOT EXISTS (SELECT 1 FROM shopping_cart"));
        assert_eq!(binds, vec![Bind::Int(7), Bind::Int(7)]);
    }

    #[test]
    fn test_filter_clause_orders_binds() {
        let filter = RecipeFilter {
            author: Some(3),
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        let (clause, binds) = filter_clause(&filter, Some(1));
        assert!(clause.starts_with(" WHERE r.author_id = ?"));
        assert_eq!(
            binds,
            vec![Bind::Int(3), Bind::Text("a".to_string()), Bind::Text("b".to_string())]
        );
    }
}
