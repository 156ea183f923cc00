//! Ingredient service
//!
//! Ingredients are reference data bulk-loaded from CSV and searched by name
//! prefix when composing recipes.

use crate::db::repositories::IngredientRepository;
use crate::models::{Ingredient, INGREDIENT_NAME_MAX_LEN, MEASUREMENT_UNIT_MAX_LEN};
use anyhow::Context;
use std::sync::Arc;

/// Error types for ingredient service operations
#[derive(Debug, thiserror::Error)]
pub enum IngredientServiceError {
    #[error("Ingredient not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Ingredient service
pub struct IngredientService {
    repo: Arc<dyn IngredientRepository>,
}

impl IngredientService {
    pub fn new(repo: Arc<dyn IngredientRepository>) -> Self {
        Self { repo }
    }

    /// Ingredients ordered by name; `name` restricts to a case-insensitive prefix
    pub async fn search(&self, name: Option<&str>) -> Result<Vec<Ingredient>, IngredientServiceError> {
        let ingredients = self
            .repo
            .list(name)
            .await
            .context("Failed to search ingredients")?;
        Ok(ingredients)
    }

    /// Get an ingredient by ID
    pub async fn get(&self, id: i64) -> Result<Ingredient, IngredientServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get ingredient")?
            .ok_or(IngredientServiceError::NotFound(id))
    }

    /// Insert a (name, unit) pair unless it already exists.
    ///
    /// Returns `true` when a new row was written.
    pub async fn import(&self, name: &str, unit: &str) -> Result<bool, IngredientServiceError> {
        let name = name.trim();
        let unit = unit.trim();

        if name.is_empty() || name.chars().count() > INGREDIENT_NAME_MAX_LEN {
            return Err(IngredientServiceError::ValidationError(format!(
                "Ingredient name must be 1 to {} characters",
                INGREDIENT_NAME_MAX_LEN
            )));
        }
        if unit.is_empty() || unit.chars().count() > MEASUREMENT_UNIT_MAX_LEN {
            return Err(IngredientServiceError::ValidationError(format!(
                "Measurement unit must be 1 to {} characters",
                MEASUREMENT_UNIT_MAX_LEN
            )));
        }

        let inserted = self
            .repo
            .create_if_absent(name, unit)
            .await
            .context("Failed to import ingredient")?;
        Ok(inserted)
    }
}
