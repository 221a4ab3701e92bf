//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::category::Category;
use super::rental::{BookHold, RentalWithUser};

/// Book row
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub language: String,
    /// Average of all ratings
    pub rating: Option<f64>,
    /// Copies owned
    pub inventory: i32,
    /// Copies not reserved, checked out or held
    pub available: i32,
    pub flair: Option<String>,
    pub archived: bool,
    pub rental_price: Decimal,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookImage {
    pub id: i32,
    #[serde(skip_serializing)]
    pub book_id: i32,
    pub image_url: String,
    pub image_small: Option<String>,
}

/// Book with its images and categories
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub images: Vec<BookImage>,
    pub categories: Vec<Category>,
}

/// Staff view of a book and who holds its copies
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookFull {
    #[serde(flatten)]
    pub details: BookDetails,
    pub outstanding_rentals: Vec<RentalWithUser>,
    pub hold: Option<BookHold>,
}

/// Compact book reference embedded in rentals
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub image_url: Option<String>,
}

/// Book list filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Category id
    pub category: Option<i32>,
    /// Case-insensitive match on title or author
    pub search: Option<String>,
}

fn validate_rental_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        return Err(ValidationError::new("rental_price")
            .with_message("Rental price cannot be negative".into()));
    }
    Ok(())
}

/// Fields for a new book, read from the multipart form
#[derive(Debug, Default, Validate)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Language must be 1-20 characters"))]
    pub language: Option<String>,
    #[validate(range(min = 0, message = "Inventory cannot be negative"))]
    pub inventory: Option<i32>,
    #[validate(length(max = 10, message = "Flair must be at most 10 characters"))]
    pub flair: Option<String>,
    pub archived: Option<bool>,
    #[validate(custom(function = "validate_rental_price"))]
    pub rental_price: Option<Decimal>,
    pub categories: Option<Vec<i32>>,
}

/// Partial book update, read from the multipart form
#[derive(Debug, Default, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Language must be 1-20 characters"))]
    pub language: Option<String>,
    #[validate(range(min = 0, message = "Inventory cannot be negative"))]
    pub inventory: Option<i32>,
    #[validate(length(max = 10, message = "Flair must be at most 10 characters"))]
    pub flair: Option<String>,
    pub archived: Option<bool>,
    #[validate(custom(function = "validate_rental_price"))]
    pub rental_price: Option<Decimal>,
    pub categories: Option<Vec<i32>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ArchiveRequest {
    pub archived: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BookCategoriesRequest {
    pub category_ids: Vec<i32>,
}
