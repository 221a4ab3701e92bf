//! Book endpoints: catalog, rental ledger, bookmarks and ratings

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{ArchiveRequest, Book, BookCategoriesRequest, BookDetails, BookFull, BookQuery, CreateBook, UpdateBook},
        rating::{Bookmark, RatingRequest, RatingResponse},
        rental::{BorrowerQuery, BorrowerRequest, LedgerResponse},
    },
    AppState,
};

use super::{AuthenticatedUser, FormData, StaffUser};

fn create_book_from_form(form: &FormData) -> AppResult<CreateBook> {
    Ok(CreateBook {
        title: form.text("title").unwrap_or_default(),
        author: form.text("author").unwrap_or_default(),
        description: form.text("description"),
        language: form.text("language"),
        inventory: form.parse("inventory")?,
        flair: form.text("flair"),
        archived: form.flag("archived")?,
        rental_price: form.parse("rental_price")?,
        categories: form.ids("categories")?,
    })
}

fn update_book_from_form(form: &FormData) -> AppResult<UpdateBook> {
    Ok(UpdateBook {
        title: form.text("title"),
        author: form.text("author"),
        description: form.text("description"),
        language: form.text("language"),
        inventory: form.parse("inventory")?,
        flair: form.text("flair"),
        archived: form.flag("archived")?,
        rental_price: form.parse("rental_price")?,
        categories: form.ids("categories")?,
    })
}

/// List books that are not archived
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Books", body = Vec<BookDetails>)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<BookDetails>>> {
    let books = state.services.catalog.list_books(&query).await?;
    Ok(Json(books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found or archived")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Staff view of a book with its outstanding rentals and hold
#[utoipa::path(
    get,
    path = "/books/{id}/full",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book with rentals", body = BookFull),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_full(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookFull>> {
    let book = state.services.catalog.get_book_full(id).await?;
    Ok(Json(book))
}

/// Create a book from a multipart form
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "Book fields, repeated categories and image_file parts"),
    responses(
        (status = 201, description = "Book created", body = BookDetails),
        (status = 400, description = "Invalid input or duplicate title"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<BookDetails>)> {
    let form = FormData::read(multipart).await?;
    let book = create_book_from_form(&form)?;
    book.validate()?;

    let created = state.services.catalog.create_book(book, form.images).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book from a multipart form
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body(content = String, content_type = "multipart/form-data", description = "Changed book fields and extra image_file parts"),
    responses(
        (status = 200, description = "Book updated", body = BookDetails),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<BookDetails>> {
    let form = FormData::read(multipart).await?;
    let book = update_book_from_form(&form)?;
    book.validate()?;

    let updated = state.services.catalog.update_book(id, book, form.images).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Archive or restore a book
#[utoipa::path(
    put,
    path = "/books/{id}/archive",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = ArchiveRequest,
    responses(
        (status = 200, description = "Archive flag set", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn set_archived(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<ArchiveRequest>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.set_archived(id, request.archived).await?;
    Ok(Json(book))
}

/// Replace the categories of a book
#[utoipa::path(
    put,
    path = "/books/{id}/categories",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = BookCategoriesRequest,
    responses(
        (status = 200, description = "Categories replaced", body = BookDetails),
        (status = 400, description = "Unknown category"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn set_categories(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<BookCategoriesRequest>,
) -> AppResult<Json<BookDetails>> {
    let book = state
        .services
        .catalog
        .set_book_categories(id, &request.category_ids)
        .await?;
    Ok(Json(book))
}

/// Put a free copy aside
#[utoipa::path(
    post,
    path = "/books/{id}/hold",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Hold placed", body = LedgerResponse),
        (status = 400, description = "Book already on hold or no available copies"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn place_hold(
    State(state): State<AppState>,
    StaffUser(claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<(StatusCode, Json<LedgerResponse>)> {
    let response = state.services.ledger.place_hold(id, claims.user_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    delete,
    path = "/books/{id}/hold",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Hold removed", body = LedgerResponse),
        (status = 404, description = "No hold on this book")
    )
)]
pub async fn remove_hold(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LedgerResponse>> {
    let response = state.services.ledger.remove_hold(id).await?;
    Ok(Json(response))
}

/// Reserve a copy against the caller's membership quota
#[utoipa::path(
    post,
    path = "/books/{id}/reserve",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 201, description = "Book reserved", body = LedgerResponse),
        (status = 400, description = "No available copies or outstanding rental"),
        (status = 403, description = "No active membership or quota exhausted"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn reserve(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<(StatusCode, Json<LedgerResponse>)> {
    let response = state.services.ledger.reserve(id, claims.user_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Cancel a reservation; staff may name the borrower by email
#[utoipa::path(
    delete,
    path = "/books/{id}/reserve",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID"), BorrowerQuery),
    responses(
        (status = 200, description = "Reservation cancelled", body = LedgerResponse),
        (status = 403, description = "Only staff may cancel for another user"),
        (status = 404, description = "No reservation found")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Query(query): Query<BorrowerQuery>,
) -> AppResult<Json<LedgerResponse>> {
    let response = state
        .services
        .ledger
        .cancel(id, &claims, query.email.as_deref())
        .await?;
    Ok(Json(response))
}

/// Hand a reserved copy to its borrower
#[utoipa::path(
    post,
    path = "/books/{id}/activate",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = BorrowerRequest,
    responses(
        (status = 200, description = "Rental activated", body = LedgerResponse),
        (status = 404, description = "No reservation found for this user and book")
    )
)]
pub async fn activate(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<BorrowerRequest>,
) -> AppResult<Json<LedgerResponse>> {
    let email = request
        .email
        .ok_or_else(|| AppError::Validation("email: this field is required".to_string()))?;
    let response = state.services.ledger.activate(id, email.trim()).await?;
    Ok(Json(response))
}

/// Return a rented copy; staff may name the borrower by email
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "rentals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = BorrowerRequest,
    responses(
        (status = 200, description = "Book returned", body = LedgerResponse),
        (status = 400, description = "No outstanding rental"),
        (status = 403, description = "Only staff may return for another user")
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<BorrowerRequest>>,
) -> AppResult<Json<LedgerResponse>> {
    let email = request.and_then(|Json(r)| r.email);
    let response = state
        .services
        .ledger
        .return_book(id, &claims, email.as_deref().map(str::trim))
        .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/books/{id}/bookmark",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Bookmarked", body = Bookmark),
        (status = 404, description = "Book not found")
    )
)]
pub async fn add_bookmark(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Bookmark>> {
    let bookmark = state.services.catalog.add_bookmark(id, claims.user_id).await?;
    Ok(Json(bookmark))
}

#[utoipa::path(
    delete,
    path = "/books/{id}/bookmark",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Bookmark removed"),
        (status = 404, description = "Bookmark not found")
    )
)]
pub async fn remove_bookmark(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.remove_bookmark(id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Books bookmarked by the caller
#[utoipa::path(
    get,
    path = "/bookmarks",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Bookmarked books", body = Vec<BookDetails>)
    )
)]
pub async fn list_bookmarks(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<BookDetails>>> {
    let books = state.services.catalog.list_bookmarks(claims.user_id).await?;
    Ok(Json(books))
}

/// Rate a book 1 to 5; 0 removes the caller's rating
#[utoipa::path(
    post,
    path = "/books/{id}/rating",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = RatingRequest,
    responses(
        (status = 200, description = "Rating stored", body = RatingResponse),
        (status = 400, description = "Rating out of range"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn rate_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<RatingRequest>,
) -> AppResult<Json<RatingResponse>> {
    let response = state
        .services
        .catalog
        .rate_book(id, claims.user_id, request.rating)
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData::from_pairs(pairs)
    }

    #[test]
    fn test_create_form_mapping() {
        let book = create_book_from_form(&form(&[
            ("title", "Dune"),
            ("author", "Frank Herbert"),
            ("inventory", "2"),
            ("rental_price", "4.00"),
            ("categories", "1"),
            ("categories", "3"),
        ]))
        .unwrap();

        assert_eq!(book.title, "Dune");
        assert_eq!(book.inventory, Some(2));
        assert_eq!(book.rental_price, Some(Decimal::new(400, 2)));
        assert_eq!(book.categories, Some(vec![1, 3]));
        assert_eq!(book.language, None);
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_create_form_requires_title() {
        let book = create_book_from_form(&form(&[("author", "Anonymous")])).unwrap();
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_negative_inventory_rejected() {
        let book = update_book_from_form(&form(&[("inventory", "-1")])).unwrap();
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_negative_rental_price_rejected() {
        let book = create_book_from_form(&form(&[
            ("title", "Dune"),
            ("author", "Frank Herbert"),
            ("rental_price", "-0.01"),
        ]))
        .unwrap();
        assert!(book.validate().is_err());

        let book = update_book_from_form(&form(&[("rental_price", "-3")])).unwrap();
        assert!(book.validate().is_err());
        let book = update_book_from_form(&form(&[("rental_price", "0")])).unwrap();
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_update_form_leaves_missing_fields() {
        let book = update_book_from_form(&form(&[("flair", "NEW")])).unwrap();
        assert_eq!(book.flair.as_deref(), Some("NEW"));
        assert!(book.title.is_none());
        assert!(book.inventory.is_none());
        assert!(book.categories.is_none());
    }
}
