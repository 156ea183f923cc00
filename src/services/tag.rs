//! Tag service
//!
//! Tags are reference data: read through the API, written only by the
//! `load-data` import.

use crate::db::repositories::TagRepository;
use crate::models::{is_valid_slug, Tag, TAG_FIELD_MAX_LEN};
use anyhow::Context;
use std::sync::Arc;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Tag not found
    #[error("Tag not found: {0}")]
    NotFound(i64),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service
pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    /// Create a new tag service
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// All tags, ordered by name
    pub async fn list(&self) -> Result<Vec<Tag>, TagServiceError> {
        let tags = self.repo.list().await.context("Failed to list tags")?;
        Ok(tags)
    }

    /// Get a tag by ID
    ///
    /// # Errors
    /// - `NotFound` if no tag has this id
    pub async fn get(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag")?
            .ok_or(TagServiceError::NotFound(id))
    }

    /// Insert a tag unless it already exists.
    ///
    /// Returns `true` when a new row was written.
    pub async fn import(&self, name: &str, slug: &str) -> Result<bool, TagServiceError> {
        let name = name.trim();
        let slug = slug.trim();

        if name.is_empty() || name.chars().count() > TAG_FIELD_MAX_LEN {
            return Err(TagServiceError::ValidationError(format!(
                "Tag name must be 1 to {} characters",
                TAG_FIELD_MAX_LEN
            )));
        }
        if !is_valid_slug(slug) {
            return Err(TagServiceError::ValidationError(format!(
                "Invalid tag slug '{}'",
                slug
            )));
        }

        let inserted = self
            .repo
            .create_if_absent(name, slug)
            .await
            .context("Failed to import tag")?;
        Ok(inserted)
    }
}
