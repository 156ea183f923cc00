//! Tag model

use serde::{Deserialize, Serialize};

/// Maximum length of a tag name and slug
pub const TAG_FIELD_MAX_LEN: usize = 32;

/// Tag entity. Reference data attached to recipes for filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    /// URL-friendly slug, used by the recipe `tags` filter
    pub slug: String,
}

/// Check a slug against `^[-a-zA-Z0-9_]+$` and the length limit
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= TAG_FIELD_MAX_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
