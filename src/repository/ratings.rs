//! Ratings and bookmarks

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::rating::{BookRating, Bookmark},
};

use super::Repository;

/// Recompute the cached average rating of a book
async fn refresh_rating(conn: &mut PgConnection, book_id: i32) -> AppResult<Option<f64>> {
    let average: Option<f64> = sqlx::query_scalar(
        r#"
        UPDATE books
        SET rating = (SELECT AVG(rating)::float8 FROM book_ratings WHERE book_id = $1)
        WHERE id = $1
        RETURNING rating
        "#,
    )
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
    Ok(average)
}

impl Repository {
    /// Create or replace a user's rating; returns it with the new average
    pub async fn ratings_set(&self, book_id: i32, user_id: i32, rating: i16) -> AppResult<(BookRating, Option<f64>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BookRating>(
            r#"
            INSERT INTO book_ratings (book_id, user_id, rating)
            VALUES ($1, $2, $3)
            ON CONFLICT (book_id, user_id) DO UPDATE SET rating = EXCLUDED.rating
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(rating)
        .fetch_one(&mut *tx)
        .await?;

        let average = refresh_rating(&mut tx, book_id).await?;
        tx.commit().await?;
        Ok((row, average))
    }

    /// Remove a user's rating (no-op when absent); returns the new average
    pub async fn ratings_delete(&self, book_id: i32, user_id: i32) -> AppResult<Option<f64>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM book_ratings WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let average = refresh_rating(&mut tx, book_id).await?;
        tx.commit().await?;
        Ok(average)
    }

    /// Add a bookmark; adding twice keeps the first one
    pub async fn bookmarks_add(&self, book_id: i32, user_id: i32) -> AppResult<Bookmark> {
        let row = sqlx::query_as::<_, Bookmark>(
            r#"
            INSERT INTO bookmarks (book_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (book_id, user_id) DO UPDATE SET book_id = EXCLUDED.book_id
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn bookmarks_remove(&self, book_id: i32, user_id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Bookmark not found".to_string()));
        }
        Ok(())
    }
}
