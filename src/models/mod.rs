//! Data models for FFLO

pub mod book;
pub mod category;
pub mod membership;
pub mod payment;
pub mod rating;
pub mod rental;
pub mod review;
pub mod user;

use serde::Serialize;
use utoipa::ToSchema;

/// Plain acknowledgement body
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub detail: String,
}

impl MessageResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

// Re-export commonly used types
pub use book::{Book, BookDetails};
pub use category::Category;
pub use membership::Membership;
pub use payment::Payment;
pub use rental::{BookHold, BookRental};
pub use user::{User, UserClaims};
