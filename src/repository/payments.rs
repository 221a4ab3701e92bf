//! Payment domain methods on Repository

use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::payment::{Payment, PaymentSummary},
};

use super::{unique_violation, Repository};

pub struct NewPayment<'a> {
    pub user_id: i32,
    pub provider_intent_id: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
    pub status: &'a str,
    pub item: &'a str,
    pub membership_id: Option<i32>,
}

/// Lock a payment for a rental and refuse one that already paid for another
pub(crate) async fn claim_payment(conn: &mut PgConnection, payment_id: i32) -> AppResult<()> {
    sqlx::query_scalar::<_, i32>("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::BadRequest("Unknown payment".to_string()))?;

    let used: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book_rentals WHERE payment_id = $1)")
            .bind(payment_id)
            .fetch_one(&mut *conn)
            .await?;
    if used {
        return Err(AppError::BadRequest("Payment has already been used".to_string()));
    }
    Ok(())
}

impl Repository {
    pub async fn payments_create(&self, payment: &NewPayment<'_>) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (user_id, provider_intent_id, amount, currency, status, item, membership_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(payment.user_id)
        .bind(payment.provider_intent_id)
        .bind(payment.amount)
        .bind(payment.currency)
        .bind(payment.status)
        .bind(payment.item)
        .bind(payment.membership_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => AppError::Conflict("Payment intent already recorded".to_string()),
            None => e.into(),
        })
    }

    pub async fn payments_get_by_intent(&self, intent_id: &str) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE provider_intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    /// Record a terminal status reported by the provider.
    /// Returns `None` when no payment matches the intent.
    pub async fn payments_set_status(&self, intent_id: &str, status: &str) -> AppResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = $2 WHERE provider_intent_id = $1 RETURNING *",
        )
        .bind(intent_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    pub async fn payments_set_item(&self, id: i32, item: &str) -> AppResult<()> {
        sqlx::query("UPDATE payments SET item = $2 WHERE id = $1")
            .bind(id)
            .bind(item)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn payments_list_for_user(&self, user_id: i32) -> AppResult<Vec<PaymentSummary>> {
        let rows = sqlx::query_as::<_, PaymentSummary>(
            r#"
            SELECT id, amount, currency, status, item, created_at
            FROM payments WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn payments_list_for_membership(&self, membership_id: i32) -> AppResult<Vec<PaymentSummary>> {
        let rows = sqlx::query_as::<_, PaymentSummary>(
            r#"
            SELECT id, amount, currency, status, item, created_at
            FROM payments WHERE membership_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
