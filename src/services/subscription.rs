//! Subscription service
//!
//! Follow edges between users: create, remove, inspect and list the caller's
//! outgoing edges, each expanded with the followed author's recipes.

use crate::db::is_unique_violation;
use crate::db::repositories::{RecipeRepository, SubscriptionRepository, UserRepository};
use crate::models::{ListParams, PagedResult, Recipe, User};
use crate::services::validation::{FieldErrors, NON_FIELD_ERRORS};
use anyhow::Context;
use std::sync::Arc;

/// Error types for subscription service operations
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionServiceError {
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A followed author with a preview of their recipes
#[derive(Debug, Clone)]
pub struct AuthorSubscription {
    pub author: User,
    /// Recipes newest first, possibly truncated by `recipes_limit`
    pub recipes: Vec<Recipe>,
    /// Total number of the author's recipes
    pub recipes_count: i64,
}

/// Whether `viewer` follows `author_id`. Anonymous viewers follow nobody.
pub async fn is_subscribed(
    viewer: Option<i64>,
    author_id: i64,
    repo: &dyn SubscriptionRepository,
) -> anyhow::Result<bool> {
    match viewer {
        Some(user_id) => repo.exists(user_id, author_id).await,
        None => Ok(false),
    }
}

/// Subscription service
pub struct SubscriptionService {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    user_repo: Arc<dyn UserRepository>,
    recipe_repo: Arc<dyn RecipeRepository>,
}

impl SubscriptionService {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        user_repo: Arc<dyn UserRepository>,
        recipe_repo: Arc<dyn RecipeRepository>,
    ) -> Self {
        Self {
            subscription_repo,
            user_repo,
            recipe_repo,
        }
    }

    /// Follow `author_id`.
    ///
    /// # Errors
    /// - `NotFound` if the author does not exist
    /// - `ValidationError` when following yourself
    /// - `Conflict` if the edge already exists
    pub async fn subscribe(
        &self,
        follower: &User,
        author_id: i64,
        recipes_limit: Option<u32>,
    ) -> Result<AuthorSubscription, SubscriptionServiceError> {
        let author = self.find_author(author_id).await?;

        if author.id == follower.id {
            return Err(SubscriptionServiceError::ValidationError(FieldErrors::single(
                NON_FIELD_ERRORS,
                "You cannot subscribe to yourself.",
            )));
        }

        let already = self
            .subscription_repo
            .exists(follower.id, author.id)
            .await
            .context("Failed to check subscription")?;
        if already {
            return Err(already_subscribed(&author));
        }

        if let Err(e) = self.subscription_repo.create(follower.id, author.id).await {
            if is_unique_violation(&e) {
                return Err(already_subscribed(&author));
            }
            return Err(e.context("Failed to create subscription").into());
        }

        tracing::debug!("User {} subscribed to {}", follower.id, author.id);
        self.expand(author, recipes_limit).await
    }

    /// Stop following `author_id`.
    ///
    /// # Errors
    /// - `NotFound` if the author or the edge does not exist
    pub async fn unsubscribe(
        &self,
        follower: &User,
        author_id: i64,
    ) -> Result<(), SubscriptionServiceError> {
        let author = self.find_author(author_id).await?;

        let removed = self
            .subscription_repo
            .delete(follower.id, author.id)
            .await
            .context("Failed to delete subscription")?;
        if !removed {
            return Err(SubscriptionServiceError::NotFound(format!(
                "You are not subscribed to {}",
                author.username
            )));
        }
        Ok(())
    }

    /// The caller's edge to `author_id`, expanded.
    ///
    /// # Errors
    /// - `NotFound` if the author or the edge does not exist
    pub async fn get(
        &self,
        follower: &User,
        author_id: i64,
        recipes_limit: Option<u32>,
    ) -> Result<AuthorSubscription, SubscriptionServiceError> {
        let author = self.find_author(author_id).await?;

        self.subscription_repo
            .get(follower.id, author.id)
            .await
            .context("Failed to get subscription")?
            .ok_or_else(|| {
                SubscriptionServiceError::NotFound(format!(
                    "You are not subscribed to {}",
                    author.username
                ))
            })?;

        self.expand(author, recipes_limit).await
    }

    /// Page of the authors the caller follows
    pub async fn list(
        &self,
        follower: &User,
        params: &ListParams,
        recipes_limit: Option<u32>,
    ) -> Result<PagedResult<AuthorSubscription>, SubscriptionServiceError> {
        let page = self
            .subscription_repo
            .list_authors(follower.id, params)
            .await
            .context("Failed to list subscriptions")?;

        let mut items = Vec::with_capacity(page.items.len());
        for author in page.items {
            items.push(self.expand(author, recipes_limit).await?);
        }

        Ok(PagedResult {
            items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn find_author(&self, author_id: i64) -> Result<User, SubscriptionServiceError> {
        self.user_repo
            .get_by_id(author_id)
            .await
            .context("Failed to get author")?
            .ok_or_else(|| SubscriptionServiceError::NotFound(format!("User {} not found", author_id)))
    }

    async fn expand(
        &self,
        author: User,
        recipes_limit: Option<u32>,
    ) -> Result<AuthorSubscription, SubscriptionServiceError> {
        let recipes = self
            .recipe_repo
            .list_by_author(author.id, recipes_limit)
            .await
            .context("Failed to list author recipes")?;
        let recipes_count = self
            .recipe_repo
            .count_by_author(author.id)
            .await
            .context("Failed to count author recipes")?;

        Ok(AuthorSubscription {
            author,
            recipes,
            recipes_count,
        })
    }
}

fn already_subscribed(author: &User) -> SubscriptionServiceError {
    SubscriptionServiceError::Conflict(format!("Already subscribed to {}", author.username))
}
