//! Recipe service
//!
//! Implements business logic for recipes:
//! - Create / update / delete with per-field validation and author-only writes
//! - Caller-relative read representation (favorite / cart / subscription flags)
//! - Favorites and shopping cart membership
//! - Shopping list aggregation
//! - Short-link codes

use crate::db::is_unique_violation;
use crate::db::repositories::{
    IngredientRepository, RecipeRepository, SubscriptionRepository, TagRepository,
    UserRecipeRepository, UserRepository,
};
use crate::models::{
    Amount, IngredientAmount, ListParams, NewRecipe, PagedResult, Recipe, RecipeChanges, RecipeFilter,
    RecipeIngredient, RecipeRelation, Tag, User, RECIPE_NAME_MAX_LEN,
};
use crate::services::image::{ImageError, ImageKind, ImageStore};
use crate::services::shopping_list::render_shopping_list;
use crate::services::short_code::{is_valid_short_code, unique_short_code, MAX_ATTEMPTS};
use crate::services::subscription::is_subscribed;
use crate::services::user::UserProfile;
use crate::services::validation::{require_text, FieldErrors};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Error types for recipe service operations
#[derive(Debug, thiserror::Error)]
pub enum RecipeServiceError {
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for RecipeServiceError {
    fn from(errors: FieldErrors) -> Self {
        RecipeServiceError::ValidationError(errors)
    }
}

/// One ingredient line of a recipe payload
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngredientInput {
    pub id: i64,
    /// JSON number, e.g. `2` or `0.5`
    pub amount: Decimal,
}

/// Recipe payload for create and update.
///
/// Every field is optional at the type level so that missing fields are
/// reported alongside other validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeInput {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    /// Base64 data URI; required on create, optional on update
    pub image: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<IngredientInput>>,
}

/// A recipe with everything its read representation needs
#[derive(Debug, Clone)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub author: UserProfile,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Validated payload, image still encoded
struct ValidRecipe {
    name: String,
    text: String,
    cooking_time: i32,
    image: Option<String>,
    tags: Vec<i64>,
    ingredients: Vec<IngredientAmount>,
}

/// Whether `viewer` has `recipe_id` in their favorites. Anonymous viewers never do.
pub async fn is_favorited(
    viewer: Option<i64>,
    recipe_id: i64,
    repo: &dyn UserRecipeRepository,
) -> anyhow::Result<bool> {
    has_relation(RecipeRelation::Favorite, viewer, recipe_id, repo).await
}

/// Whether `viewer` has `recipe_id` in their shopping cart. Anonymous viewers never do.
pub async fn is_in_shopping_cart(
    viewer: Option<i64>,
    recipe_id: i64,
    repo: &dyn UserRecipeRepository,
) -> anyhow::Result<bool> {
    has_relation(RecipeRelation::ShoppingCart, viewer, recipe_id, repo).await
}

async fn has_relation(
    relation: RecipeRelation,
    viewer: Option<i64>,
    recipe_id: i64,
    repo: &dyn UserRecipeRepository,
) -> anyhow::Result<bool> {
    match viewer {
        Some(user_id) => repo.exists(relation, user_id, recipe_id).await,
        None => Ok(false),
    }
}

/// Recipe service
pub struct RecipeService {
    recipe_repo: Arc<dyn RecipeRepository>,
    tag_repo: Arc<dyn TagRepository>,
    ingredient_repo: Arc<dyn IngredientRepository>,
    user_recipe_repo: Arc<dyn UserRecipeRepository>,
    user_repo: Arc<dyn UserRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    images: Arc<ImageStore>,
}

impl RecipeService {
    pub fn new(
        recipe_repo: Arc<dyn RecipeRepository>,
        tag_repo: Arc<dyn TagRepository>,
        ingredient_repo: Arc<dyn IngredientRepository>,
        user_recipe_repo: Arc<dyn UserRecipeRepository>,
        user_repo: Arc<dyn UserRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        images: Arc<ImageStore>,
    ) -> Self {
        Self {
            recipe_repo,
            tag_repo,
            ingredient_repo,
            user_recipe_repo,
            user_repo,
            subscription_repo,
            images,
        }
    }

    /// Create a recipe authored by `author`.
    ///
    /// # Errors
    /// - `ValidationError` for any invalid field (nothing is persisted)
    /// - `InternalError` for storage failures
    pub async fn create(&self, author: &User, input: RecipeInput) -> Result<Recipe, RecipeServiceError> {
        let valid = self.validate(input, true).await?;
        let data_uri = valid
            .image
            .as_deref()
            .context("Image missing after validation")?;
        let image = self
            .images
            .save(ImageKind::Recipe, data_uri)
            .await
            .map_err(image_error)?;

        let mut new_recipe = NewRecipe {
            author_id: author.id,
            name: valid.name,
            text: valid.text,
            cooking_time: valid.cooking_time,
            image: image.clone(),
            short_code: String::new(),
            tags: valid.tags,
            ingredients: valid.ingredients,
        };

        match self.insert_with_fresh_code(&mut new_recipe).await {
            Ok(recipe) => {
                tracing::info!("User {} created recipe {}", author.id, recipe.id);
                Ok(recipe)
            }
            Err(e) => {
                self.images.remove(&image).await;
                Err(e)
            }
        }
    }

    /// Replace a recipe's fields, tags and ingredients. Only the author may do this.
    ///
    /// The stored image is kept unless a new one is supplied; a replaced image
    /// file is deleted once the update is committed.
    pub async fn update(
        &self,
        caller: &User,
        id: i64,
        input: RecipeInput,
    ) -> Result<Recipe, RecipeServiceError> {
        let existing = self.get(id).await?;
        ensure_author(caller, &existing)?;

        let valid = self.validate(input, false).await?;
        let new_image = match valid.image.as_deref() {
            Some(data_uri) => Some(
                self.images
                    .save(ImageKind::Recipe, data_uri)
                    .await
                    .map_err(image_error)?,
            ),
            None => None,
        };

        let changes = RecipeChanges {
            name: valid.name,
            text: valid.text,
            cooking_time: valid.cooking_time,
            image: new_image.clone().unwrap_or_else(|| existing.image.clone()),
            tags: valid.tags,
            ingredients: valid.ingredients,
        };

        let updated = match self.recipe_repo.update(id, &changes).await {
            Ok(recipe) => recipe,
            Err(e) => {
                if let Some(ref image) = new_image {
                    self.images.remove(image).await;
                }
                return Err(e.context("Failed to update recipe").into());
            }
        };

        if new_image.is_some() {
            self.images.remove(&existing.image).await;
        }
        Ok(updated)
    }

    /// Delete a recipe. Only the author may do this.
    pub async fn delete(&self, caller: &User, id: i64) -> Result<(), RecipeServiceError> {
        let existing = self.get(id).await?;
        ensure_author(caller, &existing)?;

        self.recipe_repo
            .delete(id)
            .await
            .context("Failed to delete recipe")?;
        self.images.remove(&existing.image).await;

        tracing::info!("User {} deleted recipe {}", caller.id, id);
        Ok(())
    }

    /// Get a recipe by ID
    pub async fn get(&self, id: i64) -> Result<Recipe, RecipeServiceError> {
        self.recipe_repo
            .get_by_id(id)
            .await
            .context("Failed to get recipe")?
            .ok_or_else(|| RecipeServiceError::NotFound(format!("Recipe {} not found", id)))
    }

    /// Filtered page of recipes, newest first
    pub async fn list(
        &self,
        filter: &RecipeFilter,
        viewer: Option<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<Recipe>, RecipeServiceError> {
        let page = self
            .recipe_repo
            .list(filter, viewer, params)
            .await
            .context("Failed to list recipes")?;
        Ok(page)
    }

    /// Expand a recipe into its read representation for `viewer`
    pub async fn details(
        &self,
        recipe: Recipe,
        viewer: Option<i64>,
    ) -> Result<RecipeDetails, RecipeServiceError> {
        let author = self
            .user_repo
            .get_by_id(recipe.author_id)
            .await
            .context("Failed to get recipe author")?
            .with_context(|| format!("Author of recipe {} is missing", recipe.id))?;
        let author_followed = is_subscribed(viewer, author.id, self.subscription_repo.as_ref())
            .await
            .context("Failed to check subscription")?;

        let tags = self
            .tag_repo
            .list_for_recipe(recipe.id)
            .await
            .context("Failed to load recipe tags")?;
        let ingredients = self
            .ingredient_repo
            .list_for_recipe(recipe.id)
            .await
            .context("Failed to load recipe ingredients")?;

        let relations = self.user_recipe_repo.as_ref();
        let is_favorited = is_favorited(viewer, recipe.id, relations)
            .await
            .context("Failed to check favorites")?;
        let is_in_shopping_cart = is_in_shopping_cart(viewer, recipe.id, relations)
            .await
            .context("Failed to check shopping cart")?;

        Ok(RecipeDetails {
            recipe,
            author: UserProfile {
                user: author,
                is_subscribed: author_followed,
            },
            tags,
            ingredients,
            is_favorited,
            is_in_shopping_cart,
        })
    }

    /// Add a recipe to the caller's favorites or shopping cart.
    ///
    /// # Errors
    /// - `NotFound` if the recipe does not exist
    /// - `Conflict` if it is already there
    pub async fn add_to(
        &self,
        relation: RecipeRelation,
        user: &User,
        recipe_id: i64,
    ) -> Result<Recipe, RecipeServiceError> {
        let recipe = self.get(recipe_id).await?;
        let conflict = || {
            RecipeServiceError::Conflict(format!(
                "Recipe is already in {}",
                relation.label()
            ))
        };

        let present = self
            .user_recipe_repo
            .exists(relation, user.id, recipe.id)
            .await
            .context("Failed to check recipe set")?;
        if present {
            return Err(conflict());
        }

        if let Err(e) = self.user_recipe_repo.add(relation, user.id, recipe.id).await {
            if is_unique_violation(&e) {
                return Err(conflict());
            }
            return Err(e.into());
        }
        Ok(recipe)
    }

    /// Remove a recipe from the caller's favorites or shopping cart.
    ///
    /// # Errors
    /// - `NotFound` if the recipe does not exist or is not in the set
    pub async fn remove_from(
        &self,
        relation: RecipeRelation,
        user: &User,
        recipe_id: i64,
    ) -> Result<(), RecipeServiceError> {
        let recipe = self.get(recipe_id).await?;
        let removed = self
            .user_recipe_repo
            .remove(relation, user.id, recipe.id)
            .await?;
        if !removed {
            return Err(RecipeServiceError::NotFound(format!(
                "Recipe is not in {}",
                relation.label()
            )));
        }
        Ok(())
    }

    /// The caller's shopping list as plain text
    pub async fn shopping_list(&self, user: &User) -> Result<String, RecipeServiceError> {
        let totals = self
            .ingredient_repo
            .cart_totals(user.id)
            .await
            .context("Failed to aggregate shopping cart")?;
        Ok(render_shopping_list(&totals))
    }

    /// Find the recipe a short code points to
    pub async fn resolve_short_code(&self, code: &str) -> Result<Recipe, RecipeServiceError> {
        let not_found = || RecipeServiceError::NotFound(format!("Short link '{}' not found", code));
        if !is_valid_short_code(code) {
            return Err(not_found());
        }
        self.recipe_repo
            .get_by_short_code(code)
            .await
            .context("Failed to resolve short code")?
            .ok_or_else(not_found)
    }

    async fn insert_with_fresh_code(
        &self,
        recipe: &mut NewRecipe,
    ) -> Result<Recipe, RecipeServiceError> {
        for _ in 0..MAX_ATTEMPTS {
            recipe.short_code = unique_short_code(self.recipe_repo.as_ref()).await?;
            match self.recipe_repo.create(recipe).await {
                Ok(created) => return Ok(created),
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!("Short code {} taken concurrently, retrying", recipe.short_code);
                }
                Err(e) => return Err(e.context("Failed to create recipe").into()),
            }
        }
        Err(anyhow::anyhow!("Could not store recipe with a unique short code").into())
    }

    async fn validate(
        &self,
        input: RecipeInput,
        creating: bool,
    ) -> Result<ValidRecipe, RecipeServiceError> {
        let mut errors = FieldErrors::new();

        let name = require_text(&mut errors, "name", input.name.as_deref(), Some(RECIPE_NAME_MAX_LEN));
        let text = require_text(&mut errors, "text", input.text.as_deref(), None);

        let cooking_time = match input.cooking_time {
            None => {
                errors.add("cooking_time", "This field is required.");
                None
            }
            Some(t) if t < 1 => {
                errors.add("cooking_time", "Ensure this value is greater than or equal to 1.");
                None
            }
            Some(t) => match i32::try_from(t) {
                Ok(t) => Some(t),
                Err(_) => {
                    errors.add("cooking_time", "Ensure this value is less than or equal to 2147483647.");
                    None
                }
            },
        };

        let image = input.image.filter(|s| !s.trim().is_empty());
        if creating && image.is_none() {
            errors.add("image", "This field is required.");
        }

        let tags = self.validate_tags(&mut errors, input.tags).await?;
        let ingredients = self
            .validate_ingredients(&mut errors, input.ingredients)
            .await?;

        errors.into_result()?;
        match (name, text, cooking_time) {
            (Some(name), Some(text), Some(cooking_time)) => Ok(ValidRecipe {
                name,
                text,
                cooking_time,
                image,
                tags,
                ingredients,
            }),
            _ => Err(anyhow::anyhow!("Recipe fields missing after validation").into()),
        }
    }

    async fn validate_tags(
        &self,
        errors: &mut FieldErrors,
        tags: Option<Vec<i64>>,
    ) -> anyhow::Result<Vec<i64>> {
        let tags = match tags {
            None => {
                errors.add("tags", "This field is required.");
                return Ok(Vec::new());
            }
            Some(tags) if tags.is_empty() => {
                errors.add("tags", "This list may not be empty.");
                return Ok(tags);
            }
            Some(tags) => tags,
        };

        if has_duplicates(tags.iter().copied()) {
            errors.add("tags", "Tags must not repeat.");
            return Ok(tags);
        }

        let known: HashSet<i64> = self
            .tag_repo
            .get_by_ids(&tags)
            .await
            .context("Failed to look up tags")?
            .into_iter()
            .map(|t| t.id)
            .collect();
        for id in tags.iter().filter(|id| !known.contains(id)) {
            errors.add("tags", format!("Invalid pk \"{}\" - object does not exist.", id));
        }
        Ok(tags)
    }

    async fn validate_ingredients(
        &self,
        errors: &mut FieldErrors,
        ingredients: Option<Vec<IngredientInput>>,
    ) -> anyhow::Result<Vec<IngredientAmount>> {
        let items = match ingredients {
            None => {
                errors.add("ingredients", "This field is required.");
                return Ok(Vec::new());
            }
            Some(items) if items.is_empty() => {
                errors.add("ingredients", "This list may not be empty.");
                return Ok(Vec::new());
            }
            Some(items) => items,
        };

        if has_duplicates(items.iter().map(|i| i.id)) {
            errors.add("ingredients", "Ingredients must not repeat.");
            return Ok(Vec::new());
        }

        let mut amounts = Vec::with_capacity(items.len());
        for item in &items {
            match Amount::new(item.amount) {
                Some(amount) => amounts.push(IngredientAmount { id: item.id, amount }),
                None if item.amount <= Decimal::ZERO => errors.add(
                    "ingredients",
                    format!("Amount of ingredient {} must be greater than zero.", item.id),
                ),
                None => errors.add(
                    "ingredients",
                    format!(
                        "Amount of ingredient {} must have at most 10 digits, 2 of them after the decimal point.",
                        item.id
                    ),
                ),
            }
        }

        let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let known: HashSet<i64> = self
            .ingredient_repo
            .get_by_ids(&ids)
            .await
            .context("Failed to look up ingredients")?
            .into_iter()
            .map(|i| i.id)
            .collect();
        for id in ids.iter().filter(|id| !known.contains(id)) {
            errors.add("ingredients", format!("Invalid pk \"{}\" - object does not exist.", id));
        }
        Ok(amounts)
    }
}

fn ensure_author(caller: &User, recipe: &Recipe) -> Result<(), RecipeServiceError> {
    if caller.owns(recipe.author_id) {
        Ok(())
    } else {
        Err(RecipeServiceError::Forbidden(
            "Only the author can change this recipe".to_string(),
        ))
    }
}

fn has_duplicates(ids: impl Iterator<Item = i64>) -> bool {
    let mut seen = HashSet::new();
    ids.into_iter().any(|id| !seen.insert(id))
}

fn image_error(err: ImageError) -> RecipeServiceError {
    if err.is_client_error() {
        FieldErrors::single("image", err.to_string()).into()
    } else {
        RecipeServiceError::InternalError(anyhow::Error::new(err).context("Failed to store image"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;
    use crate::db::repositories::{
        SqlxIngredientRepository, SqlxRecipeRepository, SqlxSubscriptionRepository,
        SqlxTagRepository, SqlxUserRecipeRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    struct Fixture {
        pool: DynDatabasePool,
        service: RecipeService,
        media: tempfile::TempDir,
        author: User,
        stranger: User,
        tags: Vec<i64>,
        ingredients: Vec<i64>,
    }

    async fn setup() -> Fixture {
        setup_with(SqlxRecipeRepository::boxed).await
    }

    async fn setup_with(
        recipe_repo: impl FnOnce(DynDatabasePool) -> Arc<dyn RecipeRepository>,
    ) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let mut users = Vec::new();
        for name in ["author", "stranger"] {
            users.push(
                user_repo
                    .create(&User::new(
                        format!("{}@example.com", name),
                        name.to_string(),
                        "F".to_string(),
                        "L".to_string(),
                        "hash".to_string(),
                    ))
                    .await
                    .expect("Failed to create user"),
            );
        }

        let tag_repo = SqlxTagRepository::boxed(pool.clone());
        let mut tags = Vec::new();
        for (name, slug) in [("Breakfast", "breakfast"), ("Dinner", "dinner")] {
            tags.push(tag_repo.create(name, slug).await.expect("tag").id);
        }

        let ingredient_repo = SqlxIngredientRepository::boxed(pool.clone());
        let mut ingredients = Vec::new();
        for (name, unit) in [("flour", "g"), ("egg", "pcs"), ("milk", "ml")] {
            ingredients.push(ingredient_repo.create(name, unit).await.expect("ingredient").id);
        }

        let media = tempfile::tempdir().expect("Failed to create temp dir");
        let images = ImageStore::new(
            MediaConfig {
                path: media.path().to_path_buf(),
                ..MediaConfig::default()
            },
            "http://food.test",
        );

        let service = RecipeService::new(
            recipe_repo(pool.clone()),
            tag_repo,
            ingredient_repo,
            SqlxUserRecipeRepository::boxed(pool.clone()),
            user_repo,
            SqlxSubscriptionRepository::boxed(pool.clone()),
            Arc::new(images),
        );

        let stranger = users.pop().expect("stranger");
        let author = users.pop().expect("author");
        Fixture {
            pool,
            service,
            media,
            author,
            stranger,
            tags,
            ingredients,
        }
    }

    fn input(fx: &Fixture, items: &[(usize, i64)]) -> RecipeInput {
        RecipeInput {
            name: Some("Pancakes".to_string()),
            text: Some("Whisk, then fry.".to_string()),
            cooking_time: Some(20),
            image: Some(PNG.to_string()),
            tags: Some(vec![fx.tags[0]]),
            ingredients: Some(
                items
                    .iter()
                    .map(|&(i, amount)| IngredientInput {
                        id: fx.ingredients[i],
                        amount: Decimal::from(amount),
                    })
                    .collect(),
            ),
        }
    }

    fn field_errors(err: RecipeServiceError) -> FieldErrors {
        match err {
            RecipeServiceError::ValidationError(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    async fn recipe_count(fx: &Fixture) -> i64 {
        fx.service
            .list(&RecipeFilter::default(), None, &ListParams::default())
            .await
            .expect("list")
            .total
    }

    #[tokio::test]
    async fn test_create_and_details() {
        let fx = setup().await;
        let recipe = fx
            .service
            .create(&fx.author, input(&fx, &[(0, 200), (1, 2)]))
            .await
            .expect("Failed to create recipe");
        assert_eq!(recipe.short_code.len(), 10);
        assert!(fx.media.path().join(&recipe.image).exists());

        let details = fx.service.details(recipe.clone(), None).await.expect("details");
        assert_eq!(details.author.user.id, fx.author.id);
        assert!(!details.author.is_subscribed);
        assert_eq!(details.tags.len(), 1);
        assert_eq!(details.ingredients.len(), 2);
        assert!(!details.is_favorited);
        assert!(!details.is_in_shopping_cart);
    }

    #[tokio::test]
    async fn test_create_requires_every_field() {
        let fx = setup().await;
        let err = fx
            .service
            .create(&fx.author, RecipeInput::default())
            .await
            .expect_err("empty payload");
        let errors = field_errors(err);
        for field in ["name", "text", "cooking_time", "image", "tags", "ingredients"] {
            assert!(errors.has(field), "missing error for {}", field);
        }
    }

    #[tokio::test]
    async fn test_duplicates_rejected_and_nothing_persisted() {
        let fx = setup().await;

        let mut dup_tags = input(&fx, &[(0, 1)]);
        dup_tags.tags = Some(vec![fx.tags[0], fx.tags[0]]);
        let errors = field_errors(fx.service.create(&fx.author, dup_tags).await.unwrap_err());
        assert!(errors.has("tags"));

        let dup_ingredients = input(&fx, &[(0, 1), (0, 5)]);
        let errors = field_errors(
            fx.service
                .create(&fx.author, dup_ingredients)
                .await
                .unwrap_err(),
        );
        assert!(errors.has("ingredients"));

        assert_eq!(recipe_count(&fx).await, 0);
        let stored = std::fs::read_dir(fx.media.path())
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_rejects_unknown_ids_and_bad_numbers() {
        let fx = setup().await;
        let mut bad = input(&fx, &[(0, 0)]);
        bad.tags = Some(vec![404]);
        bad.cooking_time = Some(0);
        bad.ingredients.as_mut().unwrap().push(IngredientInput { id: 999, amount: Decimal::from(3) });

        let errors = field_errors(fx.service.create(&fx.author, bad).await.unwrap_err());
        assert!(errors.has("tags"));
        assert!(errors.has("cooking_time"));
        assert_eq!(errors.get("ingredients").len(), 2);
    }

    #[tokio::test]
    async fn test_update_replaces_set_and_keeps_code() {
        let fx = setup().await;
        let recipe = fx
            .service
            .create(&fx.author, input(&fx, &[(0, 200), (1, 2)]))
            .await
            .unwrap();

        let mut changes = input(&fx, &[(1, 3), (2, 250)]);
        changes.image = None;
        changes.name = Some("Crepes".to_string());
        let updated = fx
            .service
            .update(&fx.author, recipe.id, changes)
            .await
            .expect("Failed to update");

        assert_eq!(updated.name, "Crepes");
        assert_eq!(updated.image, recipe.image);
        assert_eq!(updated.short_code, recipe.short_code);

        let details = fx.service.details(updated, None).await.unwrap();
        let mut pairs: Vec<_> = details
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount.to_string()))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                (fx.ingredients[1], "3".to_string()),
                (fx.ingredients[2], "250".to_string())
            ]
        );

        let resolved = fx.service.resolve_short_code(&recipe.short_code).await.unwrap();
        assert_eq!(resolved.id, recipe.id);
    }

    #[tokio::test]
    async fn test_update_with_new_image_removes_old_file() {
        let fx = setup().await;
        let recipe = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();

        let updated = fx
            .service
            .update(&fx.author, recipe.id, input(&fx, &[(0, 1)]))
            .await
            .unwrap();
        assert_ne!(updated.image, recipe.image);
        assert!(!fx.media.path().join(&recipe.image).exists());
        assert!(fx.media.path().join(&updated.image).exists());
    }

    #[tokio::test]
    async fn test_only_author_may_write() {
        let fx = setup().await;
        let recipe = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();

        let mut changes = input(&fx, &[(2, 9)]);
        changes.name = Some("Hijacked".to_string());
        assert!(matches!(
            fx.service.update(&fx.stranger, recipe.id, changes).await,
            Err(RecipeServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.delete(&fx.stranger, recipe.id).await,
            Err(RecipeServiceError::Forbidden(_))
        ));

        let unchanged = fx.service.get(recipe.id).await.unwrap();
        assert_eq!(unchanged.name, recipe.name);
        assert_eq!(unchanged.image, recipe.image);

        fx.service.delete(&fx.author, recipe.id).await.expect("author deletes");
        assert!(matches!(
            fx.service.get(recipe.id).await,
            Err(RecipeServiceError::NotFound(_))
        ));
        assert!(!fx.media.path().join(&recipe.image).exists());
    }

    #[tokio::test]
    async fn test_favorite_and_cart_membership() {
        let fx = setup().await;
        let recipe = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();

        for relation in [RecipeRelation::Favorite, RecipeRelation::ShoppingCart] {
            fx.service
                .add_to(relation, &fx.stranger, recipe.id)
                .await
                .expect("first add");
            assert!(matches!(
                fx.service.add_to(relation, &fx.stranger, recipe.id).await,
                Err(RecipeServiceError::Conflict(_))
            ));
        }

        let details = fx
            .service
            .details(recipe.clone(), Some(fx.stranger.id))
            .await
            .unwrap();
        assert!(details.is_favorited);
        assert!(details.is_in_shopping_cart);

        let anonymous = fx.service.details(recipe.clone(), None).await.unwrap();
        assert!(!anonymous.is_favorited);
        assert!(!anonymous.is_in_shopping_cart);

        fx.service
            .remove_from(RecipeRelation::Favorite, &fx.stranger, recipe.id)
            .await
            .expect("remove");
        assert!(matches!(
            fx.service
                .remove_from(RecipeRelation::Favorite, &fx.stranger, recipe.id)
                .await,
            Err(RecipeServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.add_to(RecipeRelation::Favorite, &fx.stranger, 999).await,
            Err(RecipeServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shopping_list_sums_amounts() {
        let fx = setup().await;
        let first = fx.service.create(&fx.author, input(&fx, &[(0, 100)])).await.unwrap();
        let second = fx
            .service
            .create(&fx.author, input(&fx, &[(0, 50), (1, 2)]))
            .await
            .unwrap();

        assert_eq!(
            fx.service.shopping_list(&fx.stranger).await.unwrap(),
            "Shopping list:\n"
        );

        for recipe in [&first, &second] {
            fx.service
                .add_to(RecipeRelation::ShoppingCart, &fx.stranger, recipe.id)
                .await
                .unwrap();
        }
        let text = fx.service.shopping_list(&fx.stranger).await.unwrap();
        assert_eq!(text, "Shopping list:\n\negg (pcs): 2\nflour (g): 150\n");
    }

    #[tokio::test]
    async fn test_list_relation_filters_follow_viewer() {
        let fx = setup().await;
        let liked = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();
        let other = fx.service.create(&fx.author, input(&fx, &[(1, 1)])).await.unwrap();
        fx.service
            .add_to(RecipeRelation::Favorite, &fx.stranger, liked.id)
            .await
            .unwrap();

        let favorites = RecipeFilter {
            is_favorited: Some(true),
            ..Default::default()
        };
        let page = fx
            .service
            .list(&favorites, Some(fx.stranger.id), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![liked.id]);

        let not_favorites = RecipeFilter {
            is_favorited: Some(false),
            ..Default::default()
        };
        let page = fx
            .service
            .list(&not_favorites, Some(fx.stranger.id), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![other.id]);

        let page = fx.service.list(&favorites, None, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_short_code() {
        let fx = setup().await;
        for code in ["nope", "ABCDEFGHIJ"] {
            assert!(matches!(
                fx.service.resolve_short_code(code).await,
                Err(RecipeServiceError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_author_subscription_flag() {
        let fx = setup().await;
        let recipe = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();
        SqlxSubscriptionRepository::new(fx.pool.clone())
            .create(fx.stranger.id, fx.author.id)
            .await
            .unwrap();

        let details = fx.service.details(recipe, Some(fx.stranger.id)).await.unwrap();
        assert!(details.author.is_subscribed);
    }

    fn decimal(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    #[test]
    fn test_payload_accepts_fractional_amounts() {
        let input: RecipeInput =
            serde_json::from_str(r#"{"ingredients":[{"id":1,"amount":0.5},{"id":2,"amount":3}]}"#)
                .expect("Failed to parse payload");
        let items = input.ingredients.expect("ingredients");
        assert_eq!(items[0].amount, decimal("0.5"));
        assert_eq!(items[1].amount, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_shopping_list_sums_fractional_amounts() {
        let fx = setup().await;
        let mut half = input(&fx, &[(0, 1)]);
        half.ingredients = Some(vec![IngredientInput {
            id: fx.ingredients[0],
            amount: decimal("0.5"),
        }]);
        let mut more = input(&fx, &[(0, 1)]);
        more.ingredients = Some(vec![IngredientInput {
            id: fx.ingredients[0],
            amount: decimal("1.25"),
        }]);

        for payload in [half, more] {
            let recipe = fx.service.create(&fx.author, payload).await.unwrap();
            fx.service
                .add_to(RecipeRelation::ShoppingCart, &fx.stranger, recipe.id)
                .await
                .unwrap();
        }

        let text = fx.service.shopping_list(&fx.stranger).await.unwrap();
        assert_eq!(text, "Shopping list:\n\nflour (g): 1.75\n");
    }

    #[tokio::test]
    async fn test_rejects_amounts_the_column_cannot_hold() {
        let fx = setup().await;
        let mut bad = input(&fx, &[(0, 1)]);
        bad.ingredients = Some(vec![
            IngredientInput { id: fx.ingredients[0], amount: decimal("0.125") },
            IngredientInput { id: fx.ingredients[1], amount: decimal("100000000") },
            IngredientInput { id: fx.ingredients[2], amount: decimal("-0.5") },
        ]);

        let errors = field_errors(fx.service.create(&fx.author, bad).await.unwrap_err());
        assert_eq!(errors.get("ingredients").len(), 3);
        assert_eq!(recipe_count(&fx).await, 0);
    }

    /// Hands the first stored short code to the next insert once, as if a
    /// concurrent writer had claimed the freshly checked code.
    struct RacingRecipes {
        inner: SqlxRecipeRepository,
        first_code: Mutex<Option<String>>,
        raced: AtomicBool,
        creates: AtomicUsize,
    }

    impl RacingRecipes {
        fn new(pool: DynDatabasePool) -> Self {
            Self {
                inner: SqlxRecipeRepository::new(pool),
                first_code: Mutex::new(None),
                raced: AtomicBool::new(false),
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecipeRepository for RacingRecipes {
        async fn create(&self, recipe: &NewRecipe) -> anyhow::Result<Recipe> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let stolen = {
                let mut first = self.first_code.lock().unwrap();
                match first.as_ref() {
                    None => {
                        *first = Some(recipe.short_code.clone());
                        None
                    }
                    Some(code) if !self.raced.swap(true, Ordering::SeqCst) => Some(NewRecipe {
                        short_code: code.clone(),
                        ..recipe.clone()
                    }),
                    Some(_) => None,
                }
            };
            self.inner.create(stolen.as_ref().unwrap_or(recipe)).await
        }

        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<Recipe>> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_short_code(&self, code: &str) -> anyhow::Result<Option<Recipe>> {
            self.inner.get_by_short_code(code).await
        }

        async fn short_code_exists(&self, code: &str) -> anyhow::Result<bool> {
            self.inner.short_code_exists(code).await
        }

        async fn update(&self, id: i64, changes: &RecipeChanges) -> anyhow::Result<Recipe> {
            self.inner.update(id, changes).await
        }

        async fn delete(&self, id: i64) -> anyhow::Result<bool> {
            self.inner.delete(id).await
        }

        async fn list(
            &self,
            filter: &RecipeFilter,
            viewer: Option<i64>,
            params: &ListParams,
        ) -> anyhow::Result<PagedResult<Recipe>> {
            self.inner.list(filter, viewer, params).await
        }

        async fn list_by_author(
            &self,
            author_id: i64,
            limit: Option<u32>,
        ) -> anyhow::Result<Vec<Recipe>> {
            self.inner.list_by_author(author_id, limit).await
        }

        async fn count_by_author(&self, author_id: i64) -> anyhow::Result<i64> {
            self.inner.count_by_author(author_id).await
        }
    }

    #[tokio::test]
    async fn test_create_retries_when_code_is_taken_concurrently() {
        let racing: Arc<Mutex<Option<Arc<RacingRecipes>>>> = Arc::new(Mutex::new(None));
        let slot = racing.clone();
        let fx = setup_with(move |pool| {
            let repo = Arc::new(RacingRecipes::new(pool));
            *slot.lock().unwrap() = Some(repo.clone());
            repo
        })
        .await;
        let repo = racing.lock().unwrap().clone().expect("repository");

        let first = fx.service.create(&fx.author, input(&fx, &[(0, 1)])).await.unwrap();
        let second = fx
            .service
            .create(&fx.author, input(&fx, &[(1, 2)]))
            .await
            .expect("Failed to create after a code collision");

        assert!(repo.raced.load(Ordering::SeqCst));
        assert_eq!(repo.creates.load(Ordering::SeqCst), 3);
        assert_ne!(second.short_code, first.short_code);
        assert_eq!(recipe_count(&fx).await, 2);

        let resolved = fx.service.resolve_short_code(&second.short_code).await.unwrap();
        assert_eq!(resolved.id, second.id);
        let details = fx.service.details(second, None).await.unwrap();
        assert_eq!(details.ingredients.len(), 1);
        assert_eq!(details.ingredients[0].id, fx.ingredients[1]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_has_duplicates_matches_set_size(ids in prop::collection::vec(0i64..20, 0..12)) {
            let unique: HashSet<_> = ids.iter().copied().collect();
            prop_assert_eq!(has_duplicates(ids.iter().copied()), unique.len() != ids.len());
        }
    }
}
