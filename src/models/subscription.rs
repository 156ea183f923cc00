//! Subscription model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directed follow edge: `user_id` follows `author_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    /// The follower
    pub user_id: i64,
    /// The followed user
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
}
