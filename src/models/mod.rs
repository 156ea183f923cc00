//! Data models
//!
//! This module contains the data structures used throughout the Foodgram backend:
//! - Database entities (User, Session, Tag, Ingredient, Recipe, Subscription)
//! - Validated write payloads handed to repositories
//! - Pagination types

mod ingredient;
mod pagination;
mod recipe;
mod session;
mod subscription;
mod tag;
mod user;

pub use ingredient::{
    Amount, Ingredient, IngredientAmount, IngredientTotal, RecipeIngredient,
    AMOUNT_DECIMAL_PLACES, INGREDIENT_NAME_MAX_LEN, MAX_AMOUNT_HUNDREDTHS,
    MEASUREMENT_UNIT_MAX_LEN,
};
pub use pagination::{ListParams, PagedResult, MAX_PAGE_SIZE};
pub use recipe::{
    NewRecipe, Recipe, RecipeChanges, RecipeFilter, RecipeRelation, RECIPE_NAME_MAX_LEN,
    SHORT_CODE_LEN,
};
pub use session::Session;
pub use subscription::Subscription;
pub use tag::{is_valid_slug, Tag, TAG_FIELD_MAX_LEN};
pub use user::{is_valid_email, is_valid_username, User, EMAIL_MAX_LEN, NAME_MAX_LEN};
