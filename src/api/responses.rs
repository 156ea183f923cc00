//! Shared API response types
//!
//! Read representations of users, tags, ingredients and recipes. Image fields
//! are rendered as absolute URLs through the `ImageStore`.

use serde::Serialize;

use crate::api::common::page_links;
use crate::models::{Amount, Ingredient, PagedResult, Recipe, RecipeIngredient, Tag, User};
use crate::services::{AuthorSubscription, ImageStore, RecipeDetails, UserProfile};

// ============================================================================
// Pagination
// ============================================================================

/// Paginated list envelope
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap an already converted page, linking its neighbours
    pub fn new(
        result: PagedResult<T>,
        base_url: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Self {
        let (next, previous) = page_links(base_url, path, query, &result);
        Self {
            count: result.total,
            next,
            previous,
            results: result.items,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// User as seen by a caller
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserResponse {
    pub fn new(profile: UserProfile, images: &ImageStore) -> Self {
        let user = profile.user;
        Self {
            avatar: user.avatar.as_deref().map(|a| images.url(a)),
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed: profile.is_subscribed,
        }
    }
}

/// Response for a successful registration
#[derive(Debug, Serialize)]
pub struct UserCreatedResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserCreatedResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

/// Response for an avatar upload
#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: Option<String>,
}

/// A followed author with recipe previews
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub recipes: Vec<RecipeShortResponse>,
    pub recipes_count: i64,
}

impl SubscriptionResponse {
    /// The caller follows every author they get back, so `is_subscribed` is set
    pub fn new(subscription: AuthorSubscription, images: &ImageStore) -> Self {
        let profile = UserProfile {
            user: subscription.author,
            is_subscribed: true,
        };
        Self {
            user: UserResponse::new(profile, images),
            recipes: subscription
                .recipes
                .into_iter()
                .map(|r| RecipeShortResponse::new(r, images))
                .collect(),
            recipes_count: subscription.recipes_count,
        }
    }
}

// ============================================================================
// Reference data
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            slug: tag.slug,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

impl From<Ingredient> for IngredientResponse {
    fn from(ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
        }
    }
}

// ============================================================================
// Recipes
// ============================================================================

/// Ingredient line of a recipe
#[derive(Debug, Serialize)]
pub struct RecipeIngredientResponse {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: Amount,
}

impl From<RecipeIngredient> for RecipeIngredientResponse {
    fn from(item: RecipeIngredient) -> Self {
        Self {
            id: item.id,
            name: item.name,
            measurement_unit: item.measurement_unit,
            amount: item.amount,
        }
    }
}

/// Full recipe representation
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub tags: Vec<TagResponse>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeResponse {
    pub fn new(details: RecipeDetails, images: &ImageStore) -> Self {
        let recipe = details.recipe;
        Self {
            id: recipe.id,
            tags: details.tags.into_iter().map(TagResponse::from).collect(),
            author: UserResponse::new(details.author, images),
            ingredients: details
                .ingredients
                .into_iter()
                .map(RecipeIngredientResponse::from)
                .collect(),
            is_favorited: details.is_favorited,
            is_in_shopping_cart: details.is_in_shopping_cart,
            image: images.url(&recipe.image),
            name: recipe.name,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        }
    }
}

/// Compact recipe summary used by favorites, cart and subscriptions
#[derive(Debug, Serialize)]
pub struct RecipeShortResponse {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortResponse {
    pub fn new(recipe: Recipe, images: &ImageStore) -> Self {
        Self {
            id: recipe.id,
            image: images.url(&recipe.image),
            name: recipe.name,
            cooking_time: recipe.cooking_time,
        }
    }
}

/// Response for `get-link`
#[derive(Debug, Serialize)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}
