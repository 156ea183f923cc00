//! Services layer - Business logic
//!
//! This module contains all business logic services for the Foodgram backend.
//! Services are responsible for:
//! - Implementing business rules and per-field validation
//! - Coordinating between repositories and the image store
//! - Computing caller-relative flags for read representations

pub mod image;
pub mod ingredient;
pub mod password;
pub mod recipe;
pub mod shopping_list;
pub mod short_code;
pub mod subscription;
pub mod tag;
pub mod user;
pub mod validation;

pub use image::{ImageError, ImageKind, ImageStore};
pub use ingredient::{IngredientService, IngredientServiceError};
pub use password::{hash_password, verify_password};
pub use recipe::{
    is_favorited, is_in_shopping_cart, IngredientInput, RecipeDetails, RecipeInput, RecipeService,
    RecipeServiceError,
};
pub use shopping_list::render_shopping_list;
pub use subscription::{
    is_subscribed, AuthorSubscription, SubscriptionService, SubscriptionServiceError,
};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, RegisterInput, UserProfile, UserService, UserServiceError};
pub use validation::{FieldErrors, NON_FIELD_ERRORS};
