//! Guest-book reviews

use crate::{
    error::AppResult,
    models::review::{CreateReview, Review},
};

use super::Repository;

impl Repository {
    pub async fn reviews_list(&self) -> AppResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, Review>("SELECT * FROM reviews ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn reviews_create(&self, review: &CreateReview) -> AppResult<Review> {
        let row = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (name, message) VALUES ($1, $2) RETURNING *",
        )
        .bind(review.name.trim())
        .bind(review.message.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
