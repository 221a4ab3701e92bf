//! Payment endpoints: intents, provider webhook and cart checkout

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    error::{AppError, AppResult},
    models::payment::{
        CheckoutRequest, CheckoutResponse, CreateIntentRequest, CreateIntentResponse, FinalizeRequest,
        FinalizeResponse,
    },
    AppState,
};

use super::AuthenticatedUser;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Create a payment intent with the provider
#[utoipa::path(
    post,
    path = "/payments/create-intent",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = CreateIntentResponse),
        (status = 400, description = "Invalid amount"),
        (status = 502, description = "Payment provider error")
    )
)]
pub async fn create_intent(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateIntentRequest>,
) -> AppResult<Json<CreateIntentResponse>> {
    let response = state.services.payments.create_intent(&claims, request).await?;
    Ok(Json(response))
}

/// Provider webhook; the body is verified against the signature header
#[utoipa::path(
    post,
    path = "/payments/webhook",
    tag = "payments",
    request_body(content = String, content_type = "application/json", description = "Raw provider event"),
    responses(
        (status = 200, description = "Event processed"),
        (status = 400, description = "Invalid signature or payload")
    )
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature header".to_string()))?;

    state.services.payments.handle_webhook(&body, signature).await?;
    Ok(StatusCode::OK)
}

/// Price the rentals of a cart
#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Cart priced", body = CheckoutResponse),
        (status = 400, description = "Empty cart or more than one rental")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    let response = state
        .services
        .payments
        .checkout(claims.user_id, &request.cart_items)
        .await?;
    Ok(Json(response))
}

/// Create the reservations of a paid or fully free cart
#[utoipa::path(
    post,
    path = "/payments/checkout/finalize",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = FinalizeRequest,
    responses(
        (status = 201, description = "Reservations created", body = FinalizeResponse),
        (status = 400, description = "Payment incomplete or book unavailable"),
        (status = 403, description = "Free rental without membership quota")
    )
)]
pub async fn finalize(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<FinalizeRequest>,
) -> AppResult<(StatusCode, Json<FinalizeResponse>)> {
    let response = state.services.payments.finalize(claims.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
