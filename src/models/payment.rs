//! Payment records and checkout types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::ledger::QuoteLine;

pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

/// Append-only record of a provider payment intent
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i32,
    pub user_id: i32,
    pub provider_intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub item: String,
    pub created_at: DateTime<Utc>,
    pub membership_id: Option<i32>,
}

impl Payment {
    pub fn is_succeeded(&self) -> bool {
        self.status == STATUS_SUCCEEDED
    }
}

/// Payment line in user and membership histories
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct PaymentSummary {
    pub id: i32,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub item: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    /// Amount in currency units, e.g. 35.00
    pub amount: Decimal,
    pub item: Option<String>,
    pub membership_id: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateIntentResponse {
    pub client_secret: String,
    pub payment_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CartItemType {
    Rental,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartItem {
    #[serde(rename = "type")]
    pub item_type: CartItemType,
    pub book_id: Option<i32>,
    /// Client-side price; ignored, rentals are priced server-side
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub cart_items: Vec<CartItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub total_amount: Decimal,
    pub free_books_used: i32,
    pub rental_details: Vec<QuoteLine>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub payment_successful: bool,
    /// Provider intent id returned by create-intent
    pub stripe_payment_id: Option<String>,
    pub cart_items: Vec<CartItem>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct FinalizeResponse {
    pub detail: String,
    pub rental_ids: Vec<i32>,
    pub payment_id: Option<i32>,
}

/// Rental book ids of a cart, in order
pub fn rental_book_ids(items: &[CartItem]) -> Vec<i32> {
    items
        .iter()
        .filter(|item| item.item_type == CartItemType::Rental)
        .filter_map(|item| item.book_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_parsing_skips_unknown_items() {
        let cart: Vec<CartItem> = serde_json::from_str(
            r#"[
                {"type": "rental", "book_id": 3, "price": 5.0},
                {"type": "merch", "book_id": 9},
                {"type": "rental"}
            ]"#,
        )
        .unwrap();
        assert_eq!(cart[1].item_type, CartItemType::Other);
        assert_eq!(rental_book_ids(&cart), vec![3]);
    }
}
