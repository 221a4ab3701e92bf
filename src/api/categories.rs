//! Category endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::category::{Category, CreateCategory, ReorderCategories, UpdateCategory},
    AppState,
};

use super::StaffUser;

/// List categories in display order
#[utoipa::path(
    get,
    path = "/categories",
    tag = "categories",
    responses(
        (status = 200, description = "Categories", body = Vec<Category>)
    )
)]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(categories))
}

/// Create a category, optionally at a given position
#[utoipa::path(
    post,
    path = "/categories",
    tag = "categories",
    security(("bearer_auth" = [])),
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Invalid input or duplicate name")
    )
)]
pub async fn create_category(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Json(category): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = category.trimmed();
    category.validate()?;
    let created = state.services.catalog.create_category(category).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/categories/{id}",
    tag = "categories",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Category ID")),
    request_body = UpdateCategory,
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 404, description = "Category not found")
    )
)]
pub async fn update_category(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
    Json(category): Json<UpdateCategory>,
) -> AppResult<Json<Category>> {
    let category = category.trimmed();
    category.validate()?;
    let updated = state.services.catalog.update_category(id, category).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "categories",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Category not found")
    )
)]
pub async fn delete_category(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a complete new ordering
#[utoipa::path(
    put,
    path = "/categories/reorder",
    tag = "categories",
    security(("bearer_auth" = [])),
    request_body = ReorderCategories,
    responses(
        (status = 200, description = "Categories reordered", body = Vec<Category>),
        (status = 400, description = "Ids do not match the existing categories")
    )
)]
pub async fn reorder_categories(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Json(request): Json<ReorderCategories>,
) -> AppResult<Json<Vec<Category>>> {
    let categories = state.services.catalog.reorder_categories(&request.ids).await?;
    Ok(Json(categories))
}
