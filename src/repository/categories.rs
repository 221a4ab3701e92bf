//! Category domain methods on Repository

use sqlx::PgConnection;

use crate::{
    error::{AppError, AppResult},
    models::category::{Category, CreateCategory, UpdateCategory},
};

use super::{unique_violation, Repository};

fn name_taken(err: sqlx::Error) -> AppError {
    match unique_violation(&err) {
        Some(_) => AppError::Validation("A category with this name already exists".to_string()),
        None => err.into(),
    }
}

/// Renumber sort_order to 0..n-1 keeping the current order
async fn reindex(conn: &mut PgConnection) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE categories c
        SET sort_order = r.position
        FROM (
            SELECT id, (ROW_NUMBER() OVER (ORDER BY sort_order, id) - 1)::int AS position
            FROM categories
        ) r
        WHERE c.id = r.id
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Repository {
    pub async fn categories_list(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn categories_get_by_id(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    /// Insert at `position`, shifting the categories after it
    pub async fn categories_create(&self, data: &CreateCategory, position: Option<i32>) -> AppResult<Category> {
        let mut tx = self.pool.begin().await?;
        // serialize concurrent reorders
        sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&mut *tx)
            .await?;
        let count = count as i32;
        let position = position.map(|p| p.clamp(0, count)).unwrap_or(count);

        sqlx::query("UPDATE categories SET sort_order = sort_order + 1 WHERE sort_order >= $1")
            .bind(position)
            .execute(&mut *tx)
            .await?;

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description, color, icon, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.color)
        .bind(&data.icon)
        .bind(position)
        .fetch_one(&mut *tx)
        .await
        .map_err(name_taken)?;

        reindex(&mut tx).await?;
        tx.commit().await?;
        self.categories_get_by_id(category.id).await
    }

    pub async fn categories_update(&self, id: i32, data: &UpdateCategory) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                color = COALESCE($4, color),
                icon = COALESCE($5, icon)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.color)
        .bind(&data.icon)
        .fetch_optional(&self.pool)
        .await
        .map_err(name_taken)?
        .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    pub async fn categories_delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category with id {} not found", id)));
        }

        reindex(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply a complete ordering; `ids[i]` gets sort_order `i`.
    /// `check` sees the current ids before anything is written.
    pub async fn categories_reorder<F>(&self, ids: &[i32], check: F) -> AppResult<Vec<Category>>
    where
        F: FnOnce(&[i32]) -> AppResult<()>,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE categories IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let current: Vec<i32> = sqlx::query_scalar("SELECT id FROM categories")
            .fetch_all(&mut *tx)
            .await?;
        check(&current)?;

        sqlx::query(
            r#"
            UPDATE categories c
            SET sort_order = (o.ord - 1)::int
            FROM UNNEST($1::int[]) WITH ORDINALITY AS o(id, ord)
            WHERE c.id = o.id
            "#,
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.categories_list().await
    }
}
