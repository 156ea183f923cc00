//! Recipe short codes
//!
//! A short code is a random alphanumeric token that maps to one recipe and
//! backs the `/r/{code}` links.

use anyhow::{bail, Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::db::repositories::RecipeRepository;
use crate::models::SHORT_CODE_LEN;

/// How many fresh codes to try before giving up
pub const MAX_ATTEMPTS: usize = 16;

/// Generate a random code of [`SHORT_CODE_LEN`] ASCII letters and digits
pub fn generate_short_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_CODE_LEN)
        .map(char::from)
        .collect()
}

/// Whether `code` has the shape of a short code
pub fn is_valid_short_code(code: &str) -> bool {
    code.len() == SHORT_CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Generate a code no existing recipe uses, regenerating while it collides
pub async fn unique_short_code(repo: &dyn RecipeRepository) -> Result<String> {
    for _ in 0..MAX_ATTEMPTS {
        let code = generate_short_code();
        let taken = repo
            .short_code_exists(&code)
            .await
            .context("Failed to check short code")?;
        if !taken {
            return Ok(code);
        }
        tracing::debug!("Short code {} collided, regenerating", code);
    }
    bail!("Could not generate a unique short code after {} attempts", MAX_ATTEMPTS)
}
