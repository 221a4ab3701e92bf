//! Rental and hold models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::book::BookSummary;
use crate::ledger::{is_late, RentalState};

/// One reservation/rental lifecycle instance
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookRental {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub rental_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Null while the rental is outstanding
    pub return_date: Option<DateTime<Utc>>,
    /// Placed but not yet handed out
    pub reserved: bool,
    /// Physically checked out
    pub is_active: bool,
    /// Counted against the membership quota
    pub free: bool,
    pub payment_id: Option<i32>,
}

impl BookRental {
    pub fn state(&self) -> RentalState {
        RentalState::from_flags(self.reserved, self.is_active, self.return_date.is_some())
    }

    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        is_late(now, self.due_date, self.return_date)
    }
}

/// Staff hold on a book pending pickup
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookHold {
    pub id: i32,
    pub book_id: i32,
    /// Staff member who placed the hold
    pub user_id: i32,
    pub hold_date: DateTime<Utc>,
}

/// Rental joined with its book, for user-facing views
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RentalWithBook {
    pub id: i32,
    pub rental_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub reserved: bool,
    pub is_active: bool,
    pub free: bool,
    pub late: bool,
    pub state: RentalState,
    pub book: BookSummary,
}

/// Flat row behind [`RentalWithBook`]
#[derive(Debug, Clone, FromRow)]
pub struct RentalBookRow {
    #[sqlx(flatten)]
    pub rental: BookRental,
    pub title: String,
    pub author: String,
    pub image_url: Option<String>,
}

impl RentalBookRow {
    pub fn into_view(self, now: DateTime<Utc>) -> RentalWithBook {
        let late = self.rental.is_late(now);
        let state = self.rental.state();
        let rental = self.rental;
        RentalWithBook {
            id: rental.id,
            rental_date: rental.rental_date,
            due_date: rental.due_date,
            return_date: rental.return_date,
            reserved: rental.reserved,
            is_active: rental.is_active,
            free: rental.free,
            late,
            state,
            book: BookSummary {
                id: rental.book_id,
                title: self.title,
                author: self.author,
                image_url: self.image_url,
            },
        }
    }
}

/// Hold joined with its book
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct HoldWithBook {
    pub id: i32,
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub hold_date: DateTime<Utc>,
}

/// Outstanding rental joined with its borrower, for staff book views
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RentalWithUser {
    pub id: i32,
    pub user_id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub rental_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub reserved: bool,
    pub is_active: bool,
    pub free: bool,
}

/// Identifies the borrower when staff acts for someone else
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct BorrowerRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BorrowerQuery {
    /// Borrower email; staff only
    pub email: Option<String>,
}

/// Result of a ledger transition
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LedgerResponse {
    pub detail: String,
    pub book_id: i32,
    pub available: i32,
    pub rental: Option<BookRental>,
    /// Free books used this period after the operation
    pub monthly_books: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rental(reserved: bool, is_active: bool, returned: bool) -> BookRental {
        let now = Utc::now();
        BookRental {
            id: 1,
            book_id: 2,
            user_id: 3,
            rental_date: now - Duration::days(10),
            due_date: now - Duration::days(3),
            return_date: returned.then_some(now),
            reserved,
            is_active,
            free: true,
            payment_id: None,
        }
    }

    #[test]
    fn test_rental_state_and_lateness() {
        let now = Utc::now();
        let outstanding = rental(false, true, false);
        assert_eq!(outstanding.state(), RentalState::Active);
        assert!(outstanding.is_late(now));

        let returned = rental(false, false, true);
        assert_eq!(returned.state(), RentalState::Returned);
        assert!(!returned.is_late(now));
    }

    #[test]
    fn test_into_view() {
        let row = RentalBookRow {
            rental: rental(true, false, false),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            image_url: None,
        };
        let view = row.into_view(Utc::now());
        assert_eq!(view.state, RentalState::Reserved);
        assert_eq!(view.book.id, 2);
        assert_eq!(view.book.title, "Dune");
    }
}
