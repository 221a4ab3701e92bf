//! Catalog management service: books, categories, bookmarks, ratings and reviews

use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookFull, BookQuery, CreateBook, UpdateBook},
        category::{Category, CreateCategory, UpdateCategory},
        rating::{Bookmark, RatingResponse},
        review::{CreateReview, Review},
    },
    repository::Repository,
};

use super::media::MediaService;

/// `requested` must list every current category exactly once
fn check_reorder(current: &[i32], requested: &[i32]) -> AppResult<()> {
    let current: HashSet<i32> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(requested.len());

    for id in requested {
        if !seen.insert(*id) {
            return Err(AppError::Validation(format!("Category {} listed twice", id)));
        }
        if !current.contains(id) {
            return Err(AppError::Validation(format!("Unknown category {}", id)));
        }
    }
    if seen.len() != current.len() {
        return Err(AppError::Validation(
            "The new order must include every category".to_string(),
        ));
    }
    Ok(())
}

/// 1..5 sets a rating, 0 removes it
fn parse_rating(value: i16) -> AppResult<Option<i16>> {
    match value {
        0 => Ok(None),
        1..=5 => Ok(Some(value)),
        _ => Err(AppError::Validation(
            "Rating must be between 1 and 5, or 0 to remove it".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    media: MediaService,
}

impl CatalogService {
    pub fn new(repository: Repository, media: MediaService) -> Self {
        Self { repository, media }
    }

    // Books

    pub async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<BookDetails>> {
        let books = self.repository.books_list(query).await?;
        self.repository.books_with_details(books).await
    }

    /// Public book view; archived books are hidden
    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        let details = self.repository.books_get_details(id).await?;
        if details.book.archived {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(details)
    }

    /// Staff view including who has the copies
    pub async fn get_book_full(&self, id: i32) -> AppResult<BookFull> {
        let details = self.repository.books_get_details(id).await?;
        let outstanding_rentals = self.repository.rentals_outstanding_for_book(id).await?;
        let hold = self.repository.holds_get_for_book(id).await?;
        Ok(BookFull {
            details,
            outstanding_rentals,
            hold,
        })
    }

    /// Attach uploaded images; failures are logged and the book stays as is
    async fn attach_images(&self, book_id: i32, images: Vec<Vec<u8>>) -> AppResult<()> {
        for data in images {
            match self.media.store_book_image(data).await {
                Ok(stored) => {
                    self.repository
                        .books_add_image(book_id, &stored.image_url, &stored.image_small)
                        .await?;
                }
                Err(e) => tracing::warn!(book_id, "Book image upload failed: {}", e),
            }
        }
        Ok(())
    }

    pub async fn create_book(&self, data: CreateBook, images: Vec<Vec<u8>>) -> AppResult<BookDetails> {
        let book = self.repository.books_create(&data).await?;
        tracing::info!(book_id = book.id, "Created book \"{}\"", book.title);
        self.attach_images(book.id, images).await?;
        self.repository.books_get_details(book.id).await
    }

    pub async fn update_book(&self, id: i32, data: UpdateBook, images: Vec<Vec<u8>>) -> AppResult<BookDetails> {
        let book = self.repository.books_update(id, &data).await?;
        tracing::info!(book_id = id, available = book.available, "Updated book");
        self.attach_images(id, images).await?;
        self.repository.books_get_details(id).await
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books_delete(id).await?;
        tracing::info!(book_id = id, "Deleted book");
        Ok(())
    }

    pub async fn set_archived(&self, id: i32, archived: bool) -> AppResult<Book> {
        self.repository.books_set_archived(id, archived).await
    }

    pub async fn set_book_categories(&self, id: i32, category_ids: &[i32]) -> AppResult<BookDetails> {
        self.repository.books_set_categories(id, category_ids).await?;
        self.repository.books_get_details(id).await
    }

    // Categories

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories_list().await
    }

    pub async fn create_category(&self, data: CreateCategory) -> AppResult<Category> {
        self.repository.categories_create(&data, data.sort_order).await
    }

    pub async fn update_category(&self, id: i32, data: UpdateCategory) -> AppResult<Category> {
        self.repository.categories_update(id, &data).await
    }

    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.categories_delete(id).await
    }

    pub async fn reorder_categories(&self, ids: &[i32]) -> AppResult<Vec<Category>> {
        self.repository
            .categories_reorder(ids, |current| check_reorder(current, ids))
            .await
    }

    // Bookmarks

    pub async fn list_bookmarks(&self, user_id: i32) -> AppResult<Vec<BookDetails>> {
        let books = self.repository.books_bookmarked_by(user_id).await?;
        self.repository.books_with_details(books).await
    }

    pub async fn add_bookmark(&self, book_id: i32, user_id: i32) -> AppResult<Bookmark> {
        self.get_book(book_id).await?;
        self.repository.bookmarks_add(book_id, user_id).await
    }

    pub async fn remove_bookmark(&self, book_id: i32, user_id: i32) -> AppResult<()> {
        self.repository.bookmarks_remove(book_id, user_id).await
    }

    // Ratings

    pub async fn rate_book(&self, book_id: i32, user_id: i32, value: i16) -> AppResult<RatingResponse> {
        let rating = parse_rating(value)?;
        self.get_book(book_id).await?;

        match rating {
            Some(value) => {
                let (row, average) = self.repository.ratings_set(book_id, user_id, value).await?;
                Ok(RatingResponse {
                    book_id,
                    rating: Some(row.rating),
                    average,
                })
            }
            None => {
                let average = self.repository.ratings_delete(book_id, user_id).await?;
                Ok(RatingResponse {
                    book_id,
                    rating: None,
                    average,
                })
            }
        }
    }

    // Reviews

    pub async fn list_reviews(&self) -> AppResult<Vec<Review>> {
        self.repository.reviews_list().await
    }

    pub async fn create_review(&self, data: CreateReview) -> AppResult<Review> {
        self.repository.reviews_create(&data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_accepts_permutation() {
        assert!(check_reorder(&[1, 2, 3], &[3, 1, 2]).is_ok());
        assert!(check_reorder(&[], &[]).is_ok());
    }

    #[test]
    fn test_reorder_rejects_bad_lists() {
        assert!(check_reorder(&[1, 2, 3], &[1, 2]).is_err());
        assert!(check_reorder(&[1, 2, 3], &[1, 2, 2]).is_err());
        assert!(check_reorder(&[1, 2, 3], &[1, 2, 4]).is_err());
        assert!(check_reorder(&[1, 2], &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(0).unwrap(), None);
        assert_eq!(parse_rating(1).unwrap(), Some(1));
        assert_eq!(parse_rating(5).unwrap(), Some(5));
        assert!(parse_rating(6).is_err());
        assert!(parse_rating(-1).is_err());
    }
}
