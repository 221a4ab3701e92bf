//! Checkout pricing: which rentals are covered by the membership quota

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use super::rules::LedgerPolicy;

/// A book requested in a cart, with its catalog price
#[derive(Debug, Clone)]
pub struct PricedBook {
    pub book_id: i32,
    pub title: String,
    pub rental_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuoteLine {
    pub book_id: i32,
    pub title: String,
    pub price: Decimal,
    /// Covered by the membership quota
    pub free: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub free_books_used: i32,
    pub total_rental_amount: Decimal,
}

/// Price rentals in cart order; free slots are consumed first-come.
/// `monthly_books` is `None` when the user has no active membership.
pub fn quote_rentals(policy: &LedgerPolicy, books: &[PricedBook], monthly_books: Option<i32>) -> Quote {
    let mut remaining = monthly_books.map(|used| policy.remaining_quota(used)).unwrap_or(0);
    let mut lines = Vec::with_capacity(books.len());
    let mut free_books_used = 0;
    let mut total = Decimal::ZERO;

    for book in books {
        let free = remaining > 0;
        let price = if free {
            remaining -= 1;
            free_books_used += 1;
            Decimal::ZERO
        } else {
            book.rental_price
        };
        total += price;
        lines.push(QuoteLine {
            book_id: book.book_id,
            title: book.title.clone(),
            price,
            free,
        });
    }

    Quote {
        lines,
        free_books_used,
        total_rental_amount: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: i32, price: i64) -> PricedBook {
        PricedBook {
            book_id: id,
            title: format!("Book {}", id),
            rental_price: Decimal::new(price, 2),
        }
    }

    #[test]
    fn test_member_with_quota_rents_free() {
        let quote = quote_rentals(&LedgerPolicy::default(), &[book(1, 500)], Some(1));
        assert_eq!(quote.free_books_used, 1);
        assert_eq!(quote.total_rental_amount, Decimal::ZERO);
        assert!(quote.lines[0].free);
    }

    #[test]
    fn test_exhausted_quota_pays_price() {
        let quote = quote_rentals(&LedgerPolicy::default(), &[book(1, 500)], Some(4));
        assert_eq!(quote.free_books_used, 0);
        assert_eq!(quote.total_rental_amount, Decimal::new(500, 2));
        assert!(!quote.lines[0].free);
    }

    #[test]
    fn test_non_member_pays_everything() {
        let quote = quote_rentals(&LedgerPolicy::default(), &[book(1, 500), book(2, 350)], None);
        assert_eq!(quote.free_books_used, 0);
        assert_eq!(quote.total_rental_amount, Decimal::new(850, 2));
    }

    #[test]
    fn test_partial_quota() {
        let quote = quote_rentals(&LedgerPolicy::default(), &[book(1, 500), book(2, 350)], Some(3));
        assert_eq!(quote.free_books_used, 1);
        assert!(quote.lines[0].free);
        assert!(!quote.lines[1].free);
        assert_eq!(quote.total_rental_amount, Decimal::new(350, 2));
    }
}
