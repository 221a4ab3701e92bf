//! User domain methods on Repository

use crate::{
    error::{AppError, AppResult},
    models::user::{UpdateProfile, User, UserSummary},
};

use super::{unique_violation, Repository};

/// Fields for a new user row
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub is_staff: bool,
}

impl Repository {
    /// Get user by ID
    pub async fn users_get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by email, case-insensitively
    pub async fn users_get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Like [`Self::users_get_by_email`] but a miss is a 404
    pub async fn users_require_by_email(&self, email: &str) -> AppResult<User> {
        self.users_get_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No user with email {}", email)))
    }

    pub async fn users_create(&self, user: &NewUser<'_>) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password, first_name, last_name, phone, is_staff)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user.email.trim())
        .bind(user.password_hash)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.phone)
        .bind(user.is_staff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => AppError::Validation("A user with this email already exists".to_string()),
            None => e.into(),
        })
    }

    /// Users for the staff listing, with membership and rental flags
    pub async fn users_list(&self) -> AppResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.is_staff, u.joined_date,
                   EXISTS (
                       SELECT 1 FROM memberships m WHERE m.user_id = u.id AND m.active
                   ) AS member,
                   (
                       SELECT COUNT(*) FROM book_rentals r
                       WHERE r.user_id = u.id AND r.return_date IS NULL
                   ) AS outstanding_rentals
            FROM users u
            WHERE NOT u.archived
            ORDER BY u.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Update profile text fields; absent fields are left untouched
    pub async fn users_update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn users_set_image(&self, id: i32, image_url: &str, image_small: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET image_url = $2, image_small = $3 WHERE id = $1")
            .bind(id)
            .bind(image_url)
            .bind(image_small)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn users_set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Make an existing account staff, used by the admin bootstrap
    pub async fn users_promote_staff(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_staff = TRUE, is_active = TRUE, archived = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
