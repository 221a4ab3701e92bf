//! Guest-book endpoints

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::{
    error::AppResult,
    models::review::{CreateReview, Review},
    AppState,
};

#[utoipa::path(
    get,
    path = "/reviews",
    tag = "reviews",
    responses(
        (status = 200, description = "Reviews, newest first", body = Vec<Review>)
    )
)]
pub async fn list_reviews(State(state): State<AppState>) -> AppResult<Json<Vec<Review>>> {
    let reviews = state.services.catalog.list_reviews().await?;
    Ok(Json(reviews))
}

#[utoipa::path(
    post,
    path = "/reviews",
    tag = "reviews",
    request_body = CreateReview,
    responses(
        (status = 201, description = "Review posted", body = Review),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_review(
    State(state): State<AppState>,
    Json(review): Json<CreateReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    review.validate()?;
    let created = state.services.catalog.create_review(review).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
