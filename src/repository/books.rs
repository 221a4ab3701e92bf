//! Book catalog domain methods on Repository

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookDetails, BookImage, BookQuery, CreateBook, UpdateBook},
        category::Category,
    },
};

use super::{
    rentals::{lock_book, refresh_availability},
    unique_violation, Repository,
};

#[derive(FromRow)]
struct BookCategoryRow {
    book_id: i32,
    #[sqlx(flatten)]
    category: Category,
}

fn title_taken(err: sqlx::Error) -> AppError {
    match unique_violation(&err) {
        Some(_) => AppError::Validation("A book with this title already exists".to_string()),
        None => err.into(),
    }
}

/// Replace the category set of a book
async fn replace_categories(conn: &mut PgConnection, book_id: i32, category_ids: &[i32]) -> AppResult<()> {
    sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO book_categories (book_id, category_id)
        SELECT $1, c.id FROM categories c WHERE c.id = ANY($2)
        "#,
    )
    .bind(book_id)
    .bind(category_ids)
    .execute(&mut *conn)
    .await?;

    let mut wanted = category_ids.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    if inserted.rows_affected() != wanted.len() as u64 {
        return Err(AppError::Validation("Unknown category id".to_string()));
    }
    Ok(())
}

impl Repository {
    /// Non-archived books matching the filters, newest first
    pub async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let rows = sqlx::query_as::<_, Book>(
            r#"
            SELECT b.* FROM books b
            WHERE NOT b.archived
              AND ($1::int IS NULL OR EXISTS (
                  SELECT 1 FROM book_categories bc
                  WHERE bc.book_id = b.id AND bc.category_id = $1
              ))
              AND ($2::text IS NULL OR b.title ILIKE $2 OR b.author ILIKE $2)
            ORDER BY b.created_date DESC, b.id DESC
            "#,
        )
        .bind(query.category)
        .bind(search)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Get book by ID, archived or not
    pub async fn books_get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Attach images and categories to a batch of books
    pub async fn books_with_details(&self, books: Vec<Book>) -> AppResult<Vec<BookDetails>> {
        let ids: Vec<i32> = books.iter().map(|b| b.id).collect();

        let images = sqlx::query_as::<_, BookImage>(
            "SELECT * FROM book_images WHERE book_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let categories = sqlx::query_as::<_, BookCategoryRow>(
            r#"
            SELECT bc.book_id, c.*
            FROM book_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE bc.book_id = ANY($1)
            ORDER BY c.sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut images_by_book: HashMap<i32, Vec<BookImage>> = HashMap::new();
        for image in images {
            images_by_book.entry(image.book_id).or_default().push(image);
        }
        let mut categories_by_book: HashMap<i32, Vec<Category>> = HashMap::new();
        for row in categories {
            categories_by_book.entry(row.book_id).or_default().push(row.category);
        }

        Ok(books
            .into_iter()
            .map(|book| BookDetails {
                images: images_by_book.remove(&book.id).unwrap_or_default(),
                categories: categories_by_book.remove(&book.id).unwrap_or_default(),
                book,
            })
            .collect())
    }

    pub async fn books_get_details(&self, id: i32) -> AppResult<BookDetails> {
        let book = self.books_get_by_id(id).await?;
        self.books_with_details(vec![book])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn books_create(&self, data: &CreateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let inventory = data.inventory.unwrap_or(1);
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, description, language, inventory, available, flair, archived, rental_price)
            VALUES ($1, $2, $3, COALESCE($4, 'Français'), $5, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(data.author.trim())
        .bind(&data.description)
        .bind(&data.language)
        .bind(inventory)
        .bind(&data.flair)
        .bind(data.archived.unwrap_or(false))
        .bind(data.rental_price.unwrap_or(Decimal::new(500, 2)))
        .fetch_one(&mut *tx)
        .await
        .map_err(title_taken)?;

        if let Some(ref category_ids) = data.categories {
            replace_categories(&mut tx, book.id, category_ids).await?;
        }

        tx.commit().await?;
        Ok(book)
    }

    /// Update a book; inventory changes recompute `available` under the book lock
    pub async fn books_update(&self, id: i32, data: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;
        let locked = lock_book(&mut tx, id).await?;

        let mut sets: Vec<String> = Vec::new();
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.title, "title");
        add_field!(data.author, "author");
        add_field!(data.description, "description");
        add_field!(data.language, "language");
        add_field!(data.inventory, "inventory");
        add_field!(data.flair, "flair");
        add_field!(data.archived, "archived");
        add_field!(data.rental_price, "rental_price");

        let book = if sets.is_empty() {
            locked
        } else {
            let query = format!("UPDATE books SET {} WHERE id = $1 RETURNING *", sets.join(", "));
            let mut builder = sqlx::query_as::<_, Book>(&query).bind(id);

            macro_rules! bind_field {
                ($field:expr) => {
                    if let Some(ref val) = $field {
                        builder = builder.bind(val);
                    }
                };
            }

            bind_field!(data.title);
            bind_field!(data.author);
            bind_field!(data.description);
            bind_field!(data.language);
            bind_field!(data.inventory);
            bind_field!(data.flair);
            bind_field!(data.archived);
            bind_field!(data.rental_price);

            builder.fetch_one(&mut *tx).await.map_err(title_taken)?
        };

        if let Some(ref category_ids) = data.categories {
            replace_categories(&mut tx, id, category_ids).await?;
        }

        let available = refresh_availability(&mut tx, &book).await?;
        tx.commit().await?;
        Ok(Book { available, ..book })
    }

    pub async fn books_delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn books_set_archived(&self, id: i32, archived: bool) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("UPDATE books SET archived = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(archived)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn books_set_categories(&self, id: i32, category_ids: &[i32]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_book(&mut tx, id).await?;
        replace_categories(&mut tx, id, category_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn books_add_image(&self, book_id: i32, image_url: &str, image_small: &str) -> AppResult<BookImage> {
        let image = sqlx::query_as::<_, BookImage>(
            r#"
            INSERT INTO book_images (book_id, image_url, image_small)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(image_url)
        .bind(image_small)
        .fetch_one(&self.pool)
        .await?;
        Ok(image)
    }

    /// Books bookmarked by a user, most recent bookmark first
    pub async fn books_bookmarked_by(&self, user_id: i32) -> AppResult<Vec<Book>> {
        let rows = sqlx::query_as::<_, Book>(
            r#"
            SELECT b.* FROM books b
            JOIN bookmarks bm ON bm.book_id = b.id
            WHERE bm.user_id = $1 AND NOT b.archived
            ORDER BY bm.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
