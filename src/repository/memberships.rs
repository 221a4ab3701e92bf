//! Membership domain methods on Repository

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::membership::Membership,
};

use super::{unique_violation, Repository};

/// Active membership of a user, locked for the rest of the transaction
pub(crate) async fn lock_active_membership(
    conn: &mut PgConnection,
    user_id: i32,
) -> AppResult<Option<Membership>> {
    let membership = sqlx::query_as::<_, Membership>(
        "SELECT * FROM memberships WHERE user_id = $1 AND active FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(membership)
}

impl Repository {
    /// The single active membership of a user.
    /// Uniqueness is guaranteed by the `memberships_one_active` index.
    pub async fn memberships_get_active(&self, user_id: i32) -> AppResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 AND active",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    pub async fn memberships_get_by_id(&self, id: i32) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>("SELECT * FROM memberships WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Membership with id {} not found", id)))
    }

    /// All memberships of a user, newest first
    pub async fn memberships_list_for_user(&self, user_id: i32) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE user_id = $1 ORDER BY start_date DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn memberships_create(
        &self,
        user_id: i32,
        start_date: NaiveDate,
        recurrence: Option<NaiveDate>,
        membership_price: Decimal,
    ) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (user_id, start_date, recurrence, membership_price, active, monthly_books)
            VALUES ($1, $2, $3, $4, TRUE, 0)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .bind(recurrence)
        .bind(membership_price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => AppError::Conflict("User already has an active membership".to_string()),
            None => e.into(),
        })
    }

    pub async fn memberships_set_recurrence(&self, id: i32, recurrence: NaiveDate) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>(
            "UPDATE memberships SET recurrence = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(recurrence)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Membership with id {} not found", id)))
    }

    pub async fn memberships_deactivate(&self, id: i32, end_date: NaiveDate) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>(
            "UPDATE memberships SET active = FALSE, end_date = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(end_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Membership with id {} not found", id)))
    }

    /// Zero `monthly_books` on every active membership; returns how many were reset
    pub async fn memberships_reset_quota(&self) -> AppResult<u64> {
        let result = sqlx::query("UPDATE memberships SET monthly_books = 0 WHERE active")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
