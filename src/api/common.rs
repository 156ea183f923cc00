//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints:
//! query strings deserialized into typed structs, pagination and request
//! extractors that reject with `ApiError`.

use axum::extract::{
    rejection::{JsonRejection, QueryRejection},
    FromRequest, FromRequestParts,
};
use serde::{de::Error as _, Deserialize, Deserializer};

use crate::api::middleware::ApiError;
use crate::models::{ListParams, PagedResult};

// ============================================================================
// Extractors
// ============================================================================

/// `Json` whose rejection is reported as a validation error
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

/// `Query` whose rejection is reported as a validation error
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

/// Every query pair in request order; keys may repeat
pub type QueryPairs = Vec<(String, String)>;

// ============================================================================
// Query values
// ============================================================================

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Optional integer; blank counts as absent
pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    optional_text(deserializer)?
        .map(|v| v.parse().map_err(|_| D::Error::custom("A valid integer is required.")))
        .transpose()
}

/// Optional `1`/`true` or `0`/`false` flag, case-insensitive
pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    optional_text(deserializer)?
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(D::Error::custom("Must be a valid boolean.")),
        })
        .transpose()
}

/// Optional count that may be zero but not negative
pub fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match integer(deserializer)? {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| D::Error::custom("Ensure this value is greater than or equal to 0.")),
    }
}

/// Page number; a malformed one becomes page 0, which never exists
fn page_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(optional_text(deserializer)?.map(|v| v.parse().unwrap_or(0)))
}

/// Page size; a malformed one is ignored
fn page_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(optional_text(deserializer)?.and_then(|v| v.parse().ok()))
}

/// `?recipes_limit=` on subscription endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimitQuery {
    #[serde(default, deserialize_with = "non_negative")]
    pub recipes_limit: Option<u32>,
}

// ============================================================================
// Pagination
// ============================================================================

/// `?page=&limit=` on paginated lists
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "page_number")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "page_size")]
    pub limit: Option<u32>,
}

impl PageQuery {
    /// A malformed page is 404 like a page past the end;
    /// a malformed or zero limit falls back to the default.
    pub fn list_params(&self, default_size: u32) -> Result<ListParams, ApiError> {
        let page = match self.page {
            None => 1,
            Some(0) => return Err(ApiError::not_found("Invalid page.")),
            Some(page) => page,
        };
        let limit = self.limit.filter(|&n| n > 0).unwrap_or(default_size);
        Ok(ListParams::new(page, limit))
    }
}

/// Reject pages past the last one (page 1 is always valid)
pub fn ensure_page_exists<T>(result: &PagedResult<T>) -> Result<(), ApiError> {
    if result.page > 1 && result.page > result.total_pages() {
        return Err(ApiError::not_found("Invalid page."));
    }
    Ok(())
}

/// Absolute URLs of the neighbouring pages, keeping every other query pair
pub fn page_links<T>(
    base_url: &str,
    path: &str,
    query: &[(String, String)],
    result: &PagedResult<T>,
) -> (Option<String>, Option<String>) {
    let link = |page: u32| {
        let page = page.to_string();
        let mut pairs: Vec<(&str, &str)> = query
            .iter()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if page != "1" {
            pairs.push(("page", page.as_str()));
        }
        match serde_urlencoded::to_string(&pairs) {
            Ok(encoded) if !encoded.is_empty() => format!("{}{}?{}", base_url, path, encoded),
            _ => format!("{}{}", base_url, path),
        }
    };

    let next = result.has_next().then(|| link(result.page + 1));
    let previous = result.has_prev().then(|| link(result.page - 1));
    (next, previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::Uri};

    fn query<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
        let uri: Uri = format!("/api/test?{}", raw).parse().expect("uri");
        Query::<T>::try_from_uri(&uri)
            .map(|Query(value)| value)
            .map_err(ApiError::from)
    }

    #[derive(Debug, Deserialize)]
    struct Flags {
        #[serde(default, deserialize_with = "flag")]
        favorited: Option<bool>,
        #[serde(default, deserialize_with = "integer")]
        author: Option<i64>,
    }

    #[test]
    fn test_pairs_keep_repeated_keys_and_decoding() {
        let pairs: QueryPairs = query("tags=lunch&tags=dinner&name=sour+cream&salt=%D1%81%D0%BE%D0%BB%D1%8C").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("tags".to_string(), "lunch".to_string()),
                ("tags".to_string(), "dinner".to_string()),
                ("name".to_string(), "sour cream".to_string()),
                ("salt".to_string(), "соль".to_string()),
            ]
        );
    }

    #[test]
    fn test_typed_values() {
        let flags: Flags = query("favorited=TRUE&author=3&other=x").unwrap();
        assert_eq!(flags.favorited, Some(true));
        assert_eq!(flags.author, Some(3));

        let blank: Flags = query("favorited=&author=").unwrap();
        assert_eq!(blank.favorited, None);
        assert_eq!(blank.author, None);

        let err = query::<Flags>("favorited=maybe").unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert!(err.error.message.contains("Must be a valid boolean."));
        assert!(query::<Flags>("author=me").is_err());
    }

    #[test]
    fn test_recipes_limit() {
        let q: RecipesLimitQuery = query("recipes_limit=2").unwrap();
        assert_eq!(q.recipes_limit, Some(2));
        let q: RecipesLimitQuery = query("").unwrap();
        assert_eq!(q.recipes_limit, None);
        let err = query::<RecipesLimitQuery>("recipes_limit=-1").unwrap_err();
        assert!(err.error.message.contains("greater than or equal to 0"));
        assert!(query::<RecipesLimitQuery>("recipes_limit=abc").is_err());
    }

    #[test]
    fn test_list_params() {
        let q: PageQuery = query("page=2&limit=500").unwrap();
        let params = q.list_params(6).unwrap();
        assert_eq!(params.page, 2);
        assert_eq!(params.per_page, 100);

        let q: PageQuery = query("limit=bad").unwrap();
        assert_eq!(q.list_params(6).unwrap().per_page, 6);

        for raw in ["page=zero", "page=0", "page=-1"] {
            let q: PageQuery = query(raw).unwrap();
            assert_eq!(q.list_params(6).unwrap_err().error.code, "NOT_FOUND");
        }
    }

    #[test]
    fn test_page_links() {
        let pairs: QueryPairs = query("page=2&limit=2&tags=lunch&name=sour+cream").unwrap();
        let result = PagedResult::new(vec![1, 2], 7, &ListParams::new(2, 2));
        let (next, previous) = page_links("http://food.test", "/api/recipes", &pairs, &result);
        assert_eq!(
            next.as_deref(),
            Some("http://food.test/api/recipes?limit=2&tags=lunch&name=sour+cream&page=3")
        );
        assert_eq!(
            previous.as_deref(),
            Some("http://food.test/api/recipes?limit=2&tags=lunch&name=sour+cream")
        );
    }

    #[test]
    fn test_page_links_without_other_pairs() {
        let pairs: QueryPairs = query("page=2").unwrap();
        let result = PagedResult::new(vec![1], 2, &ListParams::new(2, 1));
        let (next, previous) = page_links("http://food.test", "/api/users", &pairs, &result);
        assert!(next.is_none());
        assert_eq!(previous.as_deref(), Some("http://food.test/api/users"));
    }

    #[test]
    fn test_page_past_end() {
        let result: PagedResult<i32> = PagedResult::new(Vec::new(), 3, &ListParams::new(5, 2));
        assert!(ensure_page_exists(&result).is_err());
        let empty: PagedResult<i32> = PagedResult::new(Vec::new(), 0, &ListParams::new(1, 2));
        assert!(ensure_page_exists(&empty).is_ok());
    }
}
