//! Recipe model
//!
//! This module provides:
//! - `Recipe` entity as stored
//! - `NewRecipe` / `RecipeChanges`, the validated write payloads the
//!   repository persists in one transaction
//! - `RecipeFilter` for list queries
//! - `RecipeRelation`, the per-user recipe sets (favorites, shopping cart)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::IngredientAmount;

/// Maximum length of a recipe name
pub const RECIPE_NAME_MAX_LEN: usize = 256;

/// Length of a recipe short code
pub const SHORT_CODE_LEN: usize = 10;

/// Recipe entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Recipe {
    /// Unique identifier
    pub id: i64,
    /// Author user ID
    pub author_id: i64,
    pub name: String,
    /// Free-form description / instructions
    pub text: String,
    /// Cooking time in minutes
    pub cooking_time: i32,
    /// Image path relative to the media root
    pub image: String,
    /// Short-link code, fixed at creation
    pub short_code: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Fully validated recipe about to be inserted
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub author_id: i64,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub short_code: String,
    pub tags: Vec<i64>,
    pub ingredients: Vec<IngredientAmount>,
}

/// Fully validated replacement of a recipe's mutable fields.
///
/// Tags and ingredients are always replaced as whole sets.
#[derive(Debug, Clone)]
pub struct RecipeChanges {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub tags: Vec<i64>,
    pub ingredients: Vec<IngredientAmount>,
}

/// Filters accepted by the recipe list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Only recipes by this author
    pub author: Option<i64>,
    /// Recipes carrying any of these tag slugs
    pub tags: Vec<String>,
    /// `Some(true)` keeps only the caller's favorites, `Some(false)` drops them
    pub is_favorited: Option<bool>,
    /// `Some(true)` keeps only recipes in the caller's cart, `Some(false)` drops them
    pub is_in_shopping_cart: Option<bool>,
}

/// A per-user set of recipes stored as a (user, recipe) join table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeRelation {
    Favorite,
    ShoppingCart,
}

impl RecipeRelation {
    /// Backing table name
    pub fn table(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "favorites",
            RecipeRelation::ShoppingCart => "shopping_cart",
        }
    }

    /// Human-readable name used in error messages
    pub fn label(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "favorites",
            RecipeRelation::ShoppingCart => "shopping cart",
        }
    }
}
