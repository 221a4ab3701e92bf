//! Rental ledger transitions
//!
//! Every transition runs in one transaction that locks the book row first,
//! then the membership row when the quota is involved, then the payment
//! row for paid reservations. `available` is never
//! adjusted inline: it is recomputed from the outstanding rentals and holds
//! right before commit.

use chrono::Utc;
use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    ledger::{compute_available, rules::ReservationCheck, AvailabilityCounts, LedgerPolicy, LedgerViolation, RentalState},
    models::{
        book::Book,
        rental::{BookHold, BookRental, HoldWithBook, RentalBookRow, RentalWithUser},
    },
};

use super::{memberships::lock_active_membership, payments::claim_payment, unique_violation, Repository};

/// Lock a book row for the rest of the transaction
pub(crate) async fn lock_book(conn: &mut PgConnection, book_id: i32) -> AppResult<Book> {
    sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
}

/// Current availability derived from outstanding rentals and holds
pub(crate) async fn count_available(conn: &mut PgConnection, book: &Book) -> AppResult<i32> {
    let (reserved, active): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE reserved),
               COUNT(*) FILTER (WHERE is_active)
        FROM book_rentals
        WHERE book_id = $1 AND return_date IS NULL
        "#,
    )
    .bind(book.id)
    .fetch_one(&mut *conn)
    .await?;

    let holds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_holds WHERE book_id = $1")
        .bind(book.id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(compute_available(AvailabilityCounts {
        inventory: book.inventory,
        reserved,
        active,
        holds,
    }))
}

/// Recompute and store `available`
pub(crate) async fn refresh_availability(conn: &mut PgConnection, book: &Book) -> AppResult<i32> {
    let available = count_available(conn, book).await?;
    sqlx::query("UPDATE books SET available = $2 WHERE id = $1")
        .bind(book.id)
        .bind(available)
        .execute(&mut *conn)
        .await?;
    Ok(available)
}

async fn outstanding_rental(
    conn: &mut PgConnection,
    book_id: i32,
    user_id: i32,
    reserved_only: bool,
) -> AppResult<Option<BookRental>> {
    let rental = sqlx::query_as::<_, BookRental>(
        r#"
        SELECT * FROM book_rentals
        WHERE book_id = $1 AND user_id = $2 AND return_date IS NULL
          AND ($3 = FALSE OR reserved)
        FOR UPDATE
        "#,
    )
    .bind(book_id)
    .bind(user_id)
    .bind(reserved_only)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(rental)
}

/// Outcome of a reservation
pub struct Reservation {
    pub rental: BookRental,
    pub available: i32,
    pub monthly_books: Option<i32>,
}

/// Outcome of a cancellation
pub struct Cancellation {
    pub available: i32,
    pub monthly_books: Option<i32>,
}

impl Repository {
    /// Staff hold: first one wins, needs a free copy
    pub async fn ledger_place_hold(
        &self,
        policy: &LedgerPolicy,
        book_id: i32,
        staff_id: i32,
    ) -> AppResult<(BookHold, i32)> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;

        let hold_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book_holds WHERE book_id = $1)")
                .bind(book_id)
                .fetch_one(&mut *tx)
                .await?;
        let available = count_available(&mut tx, &book).await?;
        policy.check_hold(available, hold_exists)?;

        let hold = sqlx::query_as::<_, BookHold>(
            "INSERT INTO book_holds (book_id, user_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(book_id)
        .bind(staff_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => AppError::from(LedgerViolation::HoldAlreadyExists),
            None => e.into(),
        })?;

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok((hold, available))
    }

    /// Remove the hold on a book; returns the new availability
    pub async fn ledger_remove_hold(&self, book_id: i32) -> AppResult<i32> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;

        let result = sqlx::query("DELETE FROM book_holds WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No hold on book {}", book_id)));
        }

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok(available)
    }

    /// Reserve a copy for a user.
    /// Free reservations need an active membership with quota left and
    /// increment `monthly_books`; paid ones (checkout) only need a copy.
    pub async fn ledger_reserve(
        &self,
        policy: &LedgerPolicy,
        book_id: i32,
        user_id: i32,
        free: bool,
        payment_id: Option<i32>,
    ) -> AppResult<Reservation> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;
        if book.archived {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }
        let membership = lock_active_membership(&mut tx, user_id).await?;
        if let Some(payment_id) = payment_id {
            claim_payment(&mut tx, payment_id).await?;
        }

        let has_outstanding: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM book_rentals WHERE user_id = $1 AND return_date IS NULL)",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let available = count_available(&mut tx, &book).await?;

        policy.check_reservation(&ReservationCheck {
            available,
            monthly_books: membership.as_ref().map(|m| m.monthly_books),
            has_outstanding,
            free,
        })?;

        let now = Utc::now();
        let rental = sqlx::query_as::<_, BookRental>(
            r#"
            INSERT INTO book_rentals (book_id, user_id, rental_date, due_date, reserved, is_active, free, payment_id)
            VALUES ($1, $2, $3, $4, TRUE, FALSE, $5, $6)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .bind(now)
        .bind(policy.due_date(now))
        .bind(free)
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some("book_rentals_payment_once") => {
                AppError::BadRequest("Payment has already been used".to_string())
            }
            Some(_) => AppError::from(LedgerViolation::OutstandingRental),
            None => e.into(),
        })?;

        let monthly_books = match (&membership, free) {
            (Some(m), true) => Some(
                sqlx::query_scalar::<_, i32>(
                    "UPDATE memberships SET monthly_books = monthly_books + 1 WHERE id = $1 RETURNING monthly_books",
                )
                .bind(m.id)
                .fetch_one(&mut *tx)
                .await?,
            ),
            (Some(m), false) => Some(m.monthly_books),
            (None, _) => None,
        };

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok(Reservation {
            rental,
            available,
            monthly_books,
        })
    }

    /// Hand a reserved copy to the user; restarts the rental period
    pub async fn ledger_activate(
        &self,
        policy: &LedgerPolicy,
        book_id: i32,
        user_id: i32,
    ) -> AppResult<(BookRental, i32)> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;

        let rental = outstanding_rental(&mut tx, book_id, user_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound("No reservation found for this user and book".to_string()))?;
        rental.state().transition(RentalState::Active)?;

        let now = Utc::now();
        let rental = sqlx::query_as::<_, BookRental>(
            r#"
            UPDATE book_rentals
            SET reserved = FALSE, is_active = TRUE, rental_date = $2, due_date = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rental.id)
        .bind(now)
        .bind(policy.due_date(now))
        .fetch_one(&mut *tx)
        .await?;

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok((rental, available))
    }

    /// Close the outstanding rental of a user on a book
    pub async fn ledger_return(&self, book_id: i32, user_id: i32) -> AppResult<(BookRental, i32)> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;

        let rental = outstanding_rental(&mut tx, book_id, user_id, false)
            .await?
            .ok_or(LedgerViolation::NoOutstandingRental)?;
        rental.state().transition(RentalState::Returned)?;

        let rental = sqlx::query_as::<_, BookRental>(
            r#"
            UPDATE book_rentals
            SET return_date = $2, reserved = FALSE, is_active = FALSE
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rental.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok((rental, available))
    }

    /// Withdraw a reservation; the row is deleted and a free slot given back
    pub async fn ledger_cancel(&self, book_id: i32, user_id: i32) -> AppResult<Cancellation> {
        let mut tx = self.pool.begin().await?;
        let book = lock_book(&mut tx, book_id).await?;

        let rental = outstanding_rental(&mut tx, book_id, user_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound("No reservation found for this user and book".to_string()))?;
        rental.state().transition(RentalState::Cancelled)?;

        sqlx::query("DELETE FROM book_rentals WHERE id = $1")
            .bind(rental.id)
            .execute(&mut *tx)
            .await?;

        let membership = lock_active_membership(&mut tx, user_id).await?;
        let monthly_books = match membership {
            Some(m) if rental.free => Some(
                sqlx::query_scalar::<_, i32>(
                    r#"
                    UPDATE memberships SET monthly_books = GREATEST(monthly_books - 1, 0)
                    WHERE id = $1
                    RETURNING monthly_books
                    "#,
                )
                .bind(m.id)
                .fetch_one(&mut *tx)
                .await?,
            ),
            Some(m) => Some(m.monthly_books),
            None => None,
        };

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok(Cancellation {
            available,
            monthly_books,
        })
    }

    /// Rentals of a user joined with their book, newest first
    pub async fn rentals_for_user(&self, user_id: i32, outstanding_only: bool) -> AppResult<Vec<RentalBookRow>> {
        let rows = sqlx::query_as::<_, RentalBookRow>(
            r#"
            SELECT r.*, b.title, b.author,
                   (SELECT i.image_url FROM book_images i WHERE i.book_id = b.id ORDER BY i.id LIMIT 1) AS image_url
            FROM book_rentals r
            JOIN books b ON b.id = r.book_id
            WHERE r.user_id = $1 AND ($2 = FALSE OR r.return_date IS NULL)
            ORDER BY r.rental_date DESC
            "#,
        )
        .bind(user_id)
        .bind(outstanding_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Outstanding rentals of a book with their borrowers
    pub async fn rentals_outstanding_for_book(&self, book_id: i32) -> AppResult<Vec<RentalWithUser>> {
        let rows = sqlx::query_as::<_, RentalWithUser>(
            r#"
            SELECT r.id, r.user_id, u.email, u.first_name, u.last_name,
                   r.rental_date, r.due_date, r.reserved, r.is_active, r.free
            FROM book_rentals r
            JOIN users u ON u.id = r.user_id
            WHERE r.book_id = $1 AND r.return_date IS NULL
            ORDER BY r.rental_date
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn holds_get_for_book(&self, book_id: i32) -> AppResult<Option<BookHold>> {
        let hold = sqlx::query_as::<_, BookHold>("SELECT * FROM book_holds WHERE book_id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hold)
    }

    /// Holds placed by a staff member
    pub async fn holds_for_staff(&self, user_id: i32) -> AppResult<Vec<HoldWithBook>> {
        let rows = sqlx::query_as::<_, HoldWithBook>(
            r#"
            SELECT h.id, h.book_id, b.title, b.author, h.hold_date
            FROM book_holds h
            JOIN books b ON b.id = h.book_id
            WHERE h.user_id = $1
            ORDER BY h.hold_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
