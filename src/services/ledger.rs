//! Rental ledger service: holds, reservations, activation, returns and cancellations

use crate::{
    error::AppResult,
    ledger::LedgerPolicy,
    models::{rental::LedgerResponse, user::UserClaims},
    repository::{rentals::Reservation, Repository},
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
    policy: LedgerPolicy,
}

impl LedgerService {
    pub fn new(repository: Repository, policy: LedgerPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// The user a request acts on: the caller, or the user behind `email` for staff
    async fn borrower(&self, claims: &UserClaims, email: Option<&str>) -> AppResult<i32> {
        match email {
            Some(email) => {
                claims.require_staff()?;
                Ok(self.repository.users_require_by_email(email).await?.id)
            }
            None => Ok(claims.user_id),
        }
    }

    pub async fn place_hold(&self, book_id: i32, staff_id: i32) -> AppResult<LedgerResponse> {
        let (hold, available) = self
            .repository
            .ledger_place_hold(&self.policy, book_id, staff_id)
            .await?;
        tracing::info!(book_id, user_id = staff_id, hold_id = hold.id, available, "Hold placed");

        Ok(LedgerResponse {
            detail: "Book placed on hold".to_string(),
            book_id,
            available,
            rental: None,
            monthly_books: None,
        })
    }

    pub async fn remove_hold(&self, book_id: i32) -> AppResult<LedgerResponse> {
        let available = self.repository.ledger_remove_hold(book_id).await?;
        tracing::info!(book_id, available, "Hold removed");

        Ok(LedgerResponse {
            detail: "Hold removed".to_string(),
            book_id,
            available,
            rental: None,
            monthly_books: None,
        })
    }

    /// Reserve a book against the caller's membership quota
    pub async fn reserve(&self, book_id: i32, user_id: i32) -> AppResult<LedgerResponse> {
        let reservation = self.reserve_with(book_id, user_id, true, None).await?;
        Ok(LedgerResponse {
            detail: "Book reserved".to_string(),
            book_id,
            available: reservation.available,
            monthly_books: reservation.monthly_books,
            rental: Some(reservation.rental),
        })
    }

    /// Reservation path shared with checkout; paid rentals skip the quota
    pub async fn reserve_with(
        &self,
        book_id: i32,
        user_id: i32,
        free: bool,
        payment_id: Option<i32>,
    ) -> AppResult<Reservation> {
        let reservation = self
            .repository
            .ledger_reserve(&self.policy, book_id, user_id, free, payment_id)
            .await?;
        tracing::info!(
            book_id,
            user_id,
            rental_id = reservation.rental.id,
            free,
            available = reservation.available,
            "Book reserved"
        );
        Ok(reservation)
    }

    /// Staff hands the reserved copy to the user behind `email`
    pub async fn activate(&self, book_id: i32, email: &str) -> AppResult<LedgerResponse> {
        let user = self.repository.users_require_by_email(email).await?;
        let (rental, available) = self
            .repository
            .ledger_activate(&self.policy, book_id, user.id)
            .await?;
        tracing::info!(book_id, user_id = user.id, rental_id = rental.id, available, "Rental activated");

        Ok(LedgerResponse {
            detail: "Rental activated".to_string(),
            book_id,
            available,
            rental: Some(rental),
            monthly_books: None,
        })
    }

    pub async fn return_book(
        &self,
        book_id: i32,
        claims: &UserClaims,
        email: Option<&str>,
    ) -> AppResult<LedgerResponse> {
        let user_id = self.borrower(claims, email).await?;
        let (rental, available) = self.repository.ledger_return(book_id, user_id).await?;
        tracing::info!(book_id, user_id, rental_id = rental.id, available, "Book returned");

        Ok(LedgerResponse {
            detail: "Book returned".to_string(),
            book_id,
            available,
            rental: Some(rental),
            monthly_books: None,
        })
    }

    pub async fn cancel(
        &self,
        book_id: i32,
        claims: &UserClaims,
        email: Option<&str>,
    ) -> AppResult<LedgerResponse> {
        let user_id = self.borrower(claims, email).await?;
        let cancellation = self.repository.ledger_cancel(book_id, user_id).await?;
        tracing::info!(
            book_id,
            user_id,
            available = cancellation.available,
            "Reservation cancelled"
        );

        Ok(LedgerResponse {
            detail: "Reservation cancelled".to_string(),
            book_id,
            available: cancellation.available,
            rental: None,
            monthly_books: cancellation.monthly_books,
        })
    }
}
