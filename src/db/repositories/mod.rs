//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for one aggregate and returns
//! plain records; services own the business rules.

pub mod ingredient;
pub mod recipe;
pub mod session;
pub mod subscription;
pub mod tag;
pub mod user;
pub mod user_recipe;

pub use ingredient::{IngredientRepository, SqlxIngredientRepository};
pub use recipe::{RecipeRepository, SqlxRecipeRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use user_recipe::{SqlxUserRecipeRepository, UserRecipeRepository};
