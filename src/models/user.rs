//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::membership::MembershipDetails;
use super::payment::PaymentSummary;
use super::rental::{HoldWithBook, RentalWithBook};
use crate::error::AppError;

/// Full user row
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_staff: bool,
    pub is_active: bool,
    pub archived: bool,
    pub image_url: Option<String>,
    pub image_small: Option<String>,
    pub joined_date: DateTime<Utc>,
}

impl User {
    pub fn image(&self) -> Option<UserImage> {
        self.image_url.as_ref().map(|url| UserImage {
            image_url: url.clone(),
            image_small: self.image_small.clone(),
        })
    }

    /// Whether the account may sign in
    pub fn can_login(&self) -> bool {
        self.is_active && !self.archived
    }
}

/// Profile picture and its icon
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserImage {
    pub image_url: String,
    pub image_small: Option<String>,
}

/// Row for staff user listings
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_staff: bool,
    pub joined_date: DateTime<Utc>,
    /// Has an active membership
    pub member: bool,
    pub outstanding_rentals: i64,
}

/// Current user view
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserInfo {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub image: Option<UserImage>,
    pub is_staff: bool,
    pub joined_date: DateTime<Utc>,
    pub membership: Option<MembershipDetails>,
    /// Outstanding rentals; not reported for staff
    pub checked_out: Option<Vec<RentalWithBook>>,
    /// Holds placed by this staff member
    pub on_hold: Option<Vec<HoldWithBook>>,
    pub book_history: Vec<RentalWithBook>,
}

/// Staff view of a user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserDetail {
    #[serde(flatten)]
    pub info: UserInfo,
    pub membership_history: Vec<MembershipDetails>,
    pub transaction_history: Vec<PaymentSummary>,
}

/// Registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub password2: String,
    #[validate(length(min = 1, max = 30, message = "First name must be 1-30 characters"))]
    pub first_name: String,
    #[validate(length(max = 30, message = "Last name must be at most 30 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetVerify {
    pub email: String,
    pub reset_code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub reset_code: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    pub new_password2: String,
}

/// Profile fields accepted from the multipart profile form
#[derive(Debug, Default, Validate)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 30, message = "First name must be 1-30 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 30, message = "Last name must be at most 30 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User email
    pub sub: String,
    pub user_id: i32,
    pub is_staff: bool,
    /// Token id, used for revocation on logout
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "You do not have permission to perform this action".to_string(),
            ))
        }
    }

    /// Staff may act on anyone, other users only on themselves
    pub fn require_self_or_staff(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_staff()
        }
    }

    /// Seconds until the token expires
    pub fn remaining_secs(&self, now: i64) -> u64 {
        (self.exp - now).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(is_staff: bool) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "reader@example.com".to_string(),
            user_id: 7,
            is_staff,
            jti: "abc".to_string(),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = claims(true).create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert!(parsed.is_staff);
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_staff_checks() {
        assert!(claims(true).require_staff().is_ok());
        assert!(claims(false).require_staff().is_err());
        assert!(claims(false).require_self_or_staff(7).is_ok());
        assert!(claims(false).require_self_or_staff(8).is_err());
        assert!(claims(true).require_self_or_staff(8).is_ok());
    }

    #[test]
    fn test_register_validation() {
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            password2: "short".to_string(),
            first_name: "Ana".to_string(),
            last_name: None,
            phone: None,
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }
}
