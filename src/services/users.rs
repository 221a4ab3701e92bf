//! Accounts: registration, authentication, profile and password management

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::{
    config::{AdminConfig, AuthConfig},
    error::{AppError, AppResult},
    models::user::{
        LoginResponse, PasswordChangeRequest, PasswordResetConfirm, PasswordResetVerify, RegisterRequest,
        UpdateProfile, User, UserClaims, UserDetail, UserInfo, UserSummary,
    },
    repository::{users::NewUser, Repository},
};

use super::{email::EmailService, media::MediaService, memberships::with_payments, redis::RedisService};

/// Six random digits, zero padded
fn generate_reset_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn check_password_pair(password: &str, confirmation: &str) -> AppResult<()> {
    if password != confirmation {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
    email: EmailService,
    media: MediaService,
}

impl UsersService {
    pub fn new(
        repository: Repository,
        config: AuthConfig,
        redis: RedisService,
        email: EmailService,
        media: MediaService,
    ) -> Self {
        Self {
            repository,
            config,
            redis,
            email,
            media,
        }
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Register a reader, or a staff member when `is_staff`
    pub async fn register(&self, request: RegisterRequest, is_staff: bool) -> AppResult<User> {
        check_password_pair(&request.password, &request.password2)?;
        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .repository
            .users_create(&NewUser {
                email: &request.email,
                password_hash: &password_hash,
                first_name: request.first_name.trim(),
                last_name: request.last_name.as_deref(),
                phone: request.phone.as_deref(),
                is_staff,
            })
            .await?;

        tracing::info!(user_id = user.id, is_staff, "Registered user {}", user.email);
        Ok(user)
    }

    /// Check credentials and issue a bearer token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .repository
            .users_get_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !user.can_login() {
            return Err(AppError::Authentication("Account is disabled".to_string()));
        }
        if !self.verify_password(&user, password)? {
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        let now = Utc::now().timestamp();
        let expires_in = self.config.jwt_expiration_hours as i64 * 3600;
        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            is_staff: user.is_staff,
            jti: Uuid::new_v4().to_string(),
            exp: now + expires_in,
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
        })
    }

    /// Revoke the presented token until it expires
    pub async fn logout(&self, claims: &UserClaims) -> AppResult<()> {
        let ttl = claims.remaining_secs(Utc::now().timestamp());
        self.redis.revoke_token(&claims.jti, ttl).await?;
        tracing::info!(user_id = claims.user_id, "User logged out");
        Ok(())
    }

    pub async fn is_token_revoked(&self, jti: &str) -> AppResult<bool> {
        self.redis.is_token_revoked(jti).await
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users_get_by_id(id).await
    }

    /// Look a borrower up by email; unknown emails are a 404
    pub async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.repository.users_require_by_email(email).await
    }

    pub async fn list(&self) -> AppResult<Vec<UserSummary>> {
        self.repository.users_list().await
    }

    /// Account view: membership, current rentals or holds, and history
    pub async fn info(&self, user_id: i32) -> AppResult<UserInfo> {
        let user = self.repository.users_get_by_id(user_id).await?;
        let now = Utc::now();

        let membership = match self.repository.memberships_get_active(user.id).await? {
            Some(m) => Some(with_payments(&self.repository, m).await?),
            None => None,
        };

        let history: Vec<_> = self
            .repository
            .rentals_for_user(user.id, false)
            .await?
            .into_iter()
            .map(|row| row.into_view(now))
            .collect();

        let (checked_out, on_hold) = if user.is_staff {
            (None, Some(self.repository.holds_for_staff(user.id).await?))
        } else {
            let outstanding = history
                .iter()
                .filter(|rental| rental.return_date.is_none())
                .cloned()
                .collect();
            (Some(outstanding), None)
        };

        Ok(UserInfo {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            image: user.image(),
            is_staff: user.is_staff,
            joined_date: user.joined_date,
            membership,
            checked_out,
            on_hold,
            book_history: history,
        })
    }

    /// Staff view of a user with membership and payment history
    pub async fn detail(&self, user_id: i32) -> AppResult<UserDetail> {
        let info = self.info(user_id).await?;

        let mut membership_history = Vec::new();
        for membership in self.repository.memberships_list_for_user(user_id).await? {
            membership_history.push(with_payments(&self.repository, membership).await?);
        }
        let transaction_history = self.repository.payments_list_for_user(user_id).await?;

        Ok(UserDetail {
            info,
            membership_history,
            transaction_history,
        })
    }

    /// Update profile fields and, optionally, the profile picture.
    /// A picture that fails to process is logged and skipped.
    pub async fn update_profile(
        &self,
        user_id: i32,
        profile: UpdateProfile,
        image: Option<Vec<u8>>,
    ) -> AppResult<UserInfo> {
        self.repository.users_update_profile(user_id, &profile).await?;

        if let Some(data) = image {
            match self.media.store_user_icon(data).await {
                Ok(stored) => {
                    self.repository
                        .users_set_image(user_id, &stored.image_url, &stored.image_small)
                        .await?;
                }
                Err(e) => tracing::warn!(user_id, "Profile image upload failed: {}", e),
            }
        }

        self.info(user_id).await
    }

    pub async fn change_password(&self, user_id: i32, request: PasswordChangeRequest) -> AppResult<()> {
        let user = self.repository.users_get_by_id(user_id).await?;
        if !self.verify_password(&user, &request.old_password)? {
            return Err(AppError::Validation("Old password is incorrect".to_string()));
        }
        check_password_pair(&request.new_password, &request.new_password2)?;

        let hash = self.hash_password(&request.new_password)?;
        self.repository.users_set_password(user.id, &hash).await
    }

    /// Email a one-time reset code
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let user = self
            .repository
            .users_get_by_email(email)
            .await?
            .ok_or_else(|| AppError::Validation("No user is registered with this email address".to_string()))?;

        let code = generate_reset_code();
        self.redis
            .store_reset_code(&user.email, &code, self.config.reset_code_ttl_secs)
            .await?;
        self.email
            .send_password_reset(&user.email, &code, self.config.reset_code_ttl_secs / 60)
            .await?;

        tracing::info!(user_id = user.id, "Password reset code sent");
        Ok(())
    }

    /// Check a reset code without consuming it
    pub async fn verify_reset_code(&self, request: &PasswordResetVerify) -> AppResult<()> {
        if !self.redis.check_reset_code(&request.email, &request.reset_code).await? {
            return Err(AppError::Validation("Invalid reset code or email".to_string()));
        }
        Ok(())
    }

    pub async fn reset_password(&self, request: PasswordResetConfirm) -> AppResult<()> {
        check_password_pair(&request.new_password, &request.new_password2)?;

        let user = self
            .repository
            .users_get_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::Validation("Invalid reset code or email".to_string()))?;

        if !self.redis.consume_reset_code(&user.email, &request.reset_code).await? {
            return Err(AppError::Validation("Invalid reset code or email".to_string()));
        }

        let hash = self.hash_password(&request.new_password)?;
        self.repository.users_set_password(user.id, &hash).await?;
        tracing::info!(user_id = user.id, "Password reset");
        Ok(())
    }

    /// Create the configured staff account if it does not exist yet
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> AppResult<()> {
        match self.repository.users_get_by_email(&admin.email).await? {
            Some(user) if user.is_staff => Ok(()),
            Some(user) => {
                self.repository.users_promote_staff(user.id).await?;
                tracing::info!(user_id = user.id, "Promoted {} to staff", user.email);
                Ok(())
            }
            None => {
                let password_hash = self.hash_password(&admin.password)?;
                let user = self
                    .repository
                    .users_create(&NewUser {
                        email: &admin.email,
                        password_hash: &password_hash,
                        first_name: &admin.first_name,
                        last_name: None,
                        phone: None,
                        is_staff: true,
                    })
                    .await?;
                tracing::info!(user_id = user.id, "Created staff account {}", user.email);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_code_shape() {
        for _ in 0..50 {
            let code = generate_reset_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_password_pair() {
        assert!(check_password_pair("hunter22", "hunter22").is_ok());
        assert!(matches!(
            check_password_pair("hunter22", "hunter23"),
            Err(AppError::Validation(_))
        ));
    }
}
