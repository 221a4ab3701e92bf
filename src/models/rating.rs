//! Ratings and bookmarks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookRating {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub rating: i16,
}

/// 1..5 sets the rating, 0 removes it
#[derive(Debug, Deserialize, ToSchema)]
pub struct RatingRequest {
    pub rating: i16,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatingResponse {
    pub book_id: i32,
    /// The caller's rating; absent once removed
    pub rating: Option<i16>,
    /// Book average after the change
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Bookmark {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}
