//! Payment provider integration: intents, webhooks and cart checkout

use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    config::PaymentsConfig,
    error::{AppError, AppResult},
    ledger::{quote_rentals, PricedBook, Quote},
    models::{
        payment::{
            rental_book_ids, CartItem, CheckoutResponse, CreateIntentRequest, CreateIntentResponse,
            FinalizeRequest, FinalizeResponse, Payment, STATUS_FAILED, STATUS_SUCCEEDED,
        },
        user::UserClaims,
    },
    repository::{payments::NewPayment, Repository},
};

use super::ledger::LedgerService;

type HmacSha256 = Hmac<Sha256>;

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<()> {
    let invalid = || AppError::BadRequest("Invalid webhook signature".to_string());

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(invalid)?;
    if (now - timestamp).abs() > tolerance_secs {
        return Err(AppError::BadRequest("Webhook timestamp outside tolerance".to_string()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    if signatures
        .iter()
        .any(|signature| mac.clone().verify_slice(signature).is_ok())
    {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Amount in the smallest currency unit
fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .filter(|cents| *cents > 0)
        .ok_or_else(|| AppError::Validation("Amount must be positive".to_string()))
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    client_secret: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
}

/// Minimal client for the provider's payment intents API
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        }
    }

    async fn create_intent(&self, amount_minor: i64, currency: &str, user_id: i32) -> AppResult<PaymentIntent> {
        // form-encoded; every value here is alphanumeric
        let body = format!(
            "amount={}&currency={}&metadata%5Buser_id%5D={}",
            amount_minor, currency, user_id
        );

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::PaymentProvider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ProviderErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("HTTP {}", status),
            };
            return Err(AppError::PaymentProvider(message));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| AppError::PaymentProvider(format!("Unexpected response: {}", e)))
    }
}

/// A cart payment must belong to the buyer, be settled by the provider and
/// cover the quoted total. Single use is enforced when the rental is written.
fn check_cart_payment(payment: &Payment, user_id: i32, total: Decimal) -> AppResult<()> {
    if payment.user_id != user_id {
        return Err(AppError::BadRequest("Unknown payment".to_string()));
    }
    if !payment.is_succeeded() {
        return Err(AppError::BadRequest("Payment failed or incomplete".to_string()));
    }
    if payment.amount < total {
        return Err(AppError::BadRequest(format!(
            "Payment of {} does not cover the cart total of {}",
            payment.amount, total
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PaymentsService {
    repository: Repository,
    ledger: LedgerService,
    stripe: StripeClient,
    config: PaymentsConfig,
}

impl PaymentsService {
    pub fn new(repository: Repository, ledger: LedgerService, config: PaymentsConfig) -> Self {
        Self {
            repository,
            ledger,
            stripe: StripeClient::new(&config),
            config,
        }
    }

    /// Create a provider intent and record it as a pending payment
    pub async fn create_intent(&self, claims: &UserClaims, request: CreateIntentRequest) -> AppResult<CreateIntentResponse> {
        let amount_minor = to_minor_units(request.amount)?;

        if let Some(membership_id) = request.membership_id {
            let membership = self.repository.memberships_get_by_id(membership_id).await?;
            claims.require_self_or_staff(membership.user_id)?;
        }

        let intent = self
            .stripe
            .create_intent(amount_minor, &self.config.currency, claims.user_id)
            .await?;

        let payment = self
            .repository
            .payments_create(&NewPayment {
                user_id: claims.user_id,
                provider_intent_id: &intent.id,
                amount: request.amount,
                currency: &self.config.currency,
                status: &intent.status,
                item: request.item.as_deref().unwrap_or(""),
                membership_id: request.membership_id,
            })
            .await?;

        tracing::info!(user_id = claims.user_id, payment_id = payment.id, "Payment intent created");
        Ok(CreateIntentResponse {
            client_secret: intent.client_secret,
            payment_id: payment.id,
        })
    }

    /// Verify and apply a provider webhook
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> AppResult<()> {
        verify_signature(
            payload,
            signature,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

        let status = match event.event_type.as_str() {
            "payment_intent.succeeded" => STATUS_SUCCEEDED,
            "payment_intent.payment_failed" => STATUS_FAILED,
            other => {
                tracing::debug!("Ignoring webhook event {}", other);
                return Ok(());
            }
        };

        let intent_id = event.data.object.id;
        match self.repository.payments_set_status(&intent_id, status).await? {
            Some(payment) => tracing::info!(payment_id = payment.id, status, "Payment status updated"),
            None => tracing::warn!("No payment found for intent {}", intent_id),
        }
        Ok(())
    }

    /// Price the rentals of a cart for the caller
    async fn quote(&self, user_id: i32, items: &[CartItem]) -> AppResult<Quote> {
        if items.is_empty() {
            return Err(AppError::BadRequest("No items in the cart".to_string()));
        }
        let book_ids = rental_book_ids(items);
        if book_ids.len() > 1 {
            return Err(AppError::BadRequest(
                "Only one book can be rented at a time".to_string(),
            ));
        }

        let mut books = Vec::with_capacity(book_ids.len());
        for book_id in book_ids {
            let book = self.repository.books_get_by_id(book_id).await?;
            if book.archived {
                return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
            }
            books.push(PricedBook {
                book_id: book.id,
                title: book.title,
                rental_price: book.rental_price,
            });
        }

        let membership = self.repository.memberships_get_active(user_id).await?;
        Ok(quote_rentals(
            self.ledger.policy(),
            &books,
            membership.map(|m| m.monthly_books),
        ))
    }

    pub async fn checkout(&self, user_id: i32, items: &[CartItem]) -> AppResult<CheckoutResponse> {
        let quote = self.quote(user_id, items).await?;
        Ok(CheckoutResponse {
            total_amount: quote.total_rental_amount,
            free_books_used: quote.free_books_used,
            rental_details: quote.lines,
        })
    }

    /// Turn a paid (or fully free) cart into reservations
    pub async fn finalize(&self, user_id: i32, request: FinalizeRequest) -> AppResult<FinalizeResponse> {
        let quote = self.quote(user_id, &request.cart_items).await?;

        let payment = if quote.total_rental_amount > Decimal::ZERO {
            let intent_id = match (&request.stripe_payment_id, request.payment_successful) {
                (Some(id), true) => id,
                _ => return Err(AppError::BadRequest("Payment failed or incomplete".to_string())),
            };
            let payment = self
                .repository
                .payments_get_by_intent(intent_id)
                .await?
                .ok_or_else(|| AppError::BadRequest("Unknown payment".to_string()))?;
            check_cart_payment(&payment, user_id, quote.total_rental_amount)?;
            Some(payment)
        } else {
            None
        };
        let payment_id = payment.as_ref().map(|p| p.id);

        let mut rental_ids = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            let reservation = self
                .ledger
                .reserve_with(
                    line.book_id,
                    user_id,
                    line.free,
                    if line.free { None } else { payment_id },
                )
                .await?;
            rental_ids.push(reservation.rental.id);
        }

        if let Some(id) = payment_id {
            self.repository.payments_set_item(id, "Book Rentals").await?;
        }

        tracing::info!(user_id, ?rental_ids, "Checkout finalized");
        Ok(FinalizeResponse {
            detail: "Checkout finalized successfully".to_string(),
            rental_ids,
            payment_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    const PAYLOAD: &[u8] = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;

    #[test]
    fn test_valid_signature() {
        let header = format!("t=1000,v1={}", sign("whsec", 1000, PAYLOAD));
        assert!(verify_signature(PAYLOAD, &header, "whsec", 300, 1100).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let header = format!("t=1000,v1=deadbeef,v1={}", sign("whsec", 1000, PAYLOAD));
        assert!(verify_signature(PAYLOAD, &header, "whsec", 300, 1000).is_ok());
    }

    #[test]
    fn test_wrong_secret_or_body() {
        let header = format!("t=1000,v1={}", sign("other", 1000, PAYLOAD));
        assert!(verify_signature(PAYLOAD, &header, "whsec", 300, 1000).is_err());

        let header = format!("t=1000,v1={}", sign("whsec", 1000, PAYLOAD));
        assert!(verify_signature(b"{}", &header, "whsec", 300, 1000).is_err());
    }

    #[test]
    fn test_stale_timestamp() {
        let header = format!("t=1000,v1={}", sign("whsec", 1000, PAYLOAD));
        let err = verify_signature(PAYLOAD, &header, "whsec", 300, 1301).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_malformed_header() {
        assert!(verify_signature(PAYLOAD, "garbage", "whsec", 300, 1000).is_err());
        assert!(verify_signature(PAYLOAD, "t=1000", "whsec", 300, 1000).is_err());
    }

    #[test]
    fn test_webhook_event_shape() {
        let event: WebhookEvent = serde_json::from_slice(PAYLOAD).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object.id, "pi_123");
    }

    fn payment(user_id: i32, status: &str, amount: Decimal) -> Payment {
        Payment {
            id: 7,
            user_id,
            provider_intent_id: "pi_123".to_string(),
            amount,
            currency: "usd".to_string(),
            status: status.to_string(),
            item: String::new(),
            created_at: chrono::Utc::now(),
            membership_id: None,
        }
    }

    #[test]
    fn test_cart_payment_must_be_settled() {
        let total = Decimal::new(500, 2);
        assert!(check_cart_payment(&payment(1, STATUS_SUCCEEDED, total), 1, total).is_ok());

        let pending = payment(1, "requires_payment_method", total);
        let err = check_cart_payment(&pending, 1, total).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(check_cart_payment(&payment(1, STATUS_FAILED, total), 1, total).is_err());
    }

    #[test]
    fn test_cart_payment_must_cover_total() {
        let total = Decimal::new(500, 2);
        let cents = payment(1, STATUS_SUCCEEDED, Decimal::new(1, 2));
        assert!(check_cart_payment(&cents, 1, total).is_err());
        let more = payment(1, STATUS_SUCCEEDED, Decimal::new(1000, 2));
        assert!(check_cart_payment(&more, 1, total).is_ok());
    }

    #[test]
    fn test_cart_payment_of_another_user() {
        let total = Decimal::new(500, 2);
        assert!(check_cart_payment(&payment(2, STATUS_SUCCEEDED, total), 1, total).is_err());
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(3500, 2)).unwrap(), 3500);
        assert_eq!(to_minor_units(Decimal::new(5, 0)).unwrap(), 500);
        assert!(to_minor_units(Decimal::ZERO).is_err());
        assert!(to_minor_units(Decimal::new(-100, 2)).is_err());
    }
}
