//! Membership model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::payment::PaymentSummary;

/// Per-user subscription record
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Membership {
    pub id: i32,
    pub user_id: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    /// Free books taken this period
    pub monthly_books: i32,
    /// Next billing date
    pub recurrence: Option<NaiveDate>,
    pub membership_price: Decimal,
}

/// Membership with the payments attached to it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MembershipDetails {
    #[serde(flatten)]
    pub membership: Membership,
    pub transaction_history: Vec<PaymentSummary>,
}

/// Quota view for the current user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MembershipInfo {
    pub member_status: bool,
    pub monthly_books: i32,
    pub monthly_quota: i32,
    pub remaining_books: i32,
    pub membership: Option<Membership>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMembership {
    /// Target user; defaults to the caller
    pub user_id: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub recurrence: Option<NaiveDate>,
    pub membership_price: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaResetResponse {
    pub detail: String,
    /// Number of memberships reset
    pub reset: u64,
}
