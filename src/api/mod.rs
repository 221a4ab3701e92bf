//! API handlers for FFLO REST endpoints

pub mod accounts;
pub mod books;
pub mod categories;
pub mod health;
pub mod openapi;
pub mod payments;
pub mod reviews;

use std::{collections::HashMap, str::FromStr};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::Multipart;

use crate::{
    error::{AppError, AppResult},
    models::user::UserClaims,
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Get the Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        if state.services.users.is_token_revoked(&claims.jti).await? {
            return Err(AppError::Authentication("Token has been revoked".to_string()));
        }

        Ok(AuthenticatedUser(claims))
    }
}

/// Extractor that only lets staff accounts through
pub struct StaffUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(claims) = AuthenticatedUser::from_request_parts(parts, state).await?;
        claims.require_staff()?;
        Ok(StaffUser(claims))
    }
}

/// Name of the file parts carrying uploaded images
pub const IMAGE_FIELD: &str = "image_file";

/// Text fields and uploaded images of a multipart form
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    pub images: Vec<Vec<u8>>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == IMAGE_FIELD {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?;
                if !data.is_empty() {
                    form.images.push(data.to_vec());
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid field {}: {}", name, e)))?;
                form.fields.entry(name).or_default().push(value);
            }
        }

        Ok(form)
    }

    #[cfg(test)]
    fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut form = FormData::default();
        for (name, value) in pairs {
            form.fields
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        form
    }

    /// First value of a text field; blank values count as absent
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> AppResult<Option<T>> {
        self.text(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| AppError::Validation(format!("{}: invalid value", name)))
            })
            .transpose()
    }

    /// Checkbox style booleans: `true`/`on`/`1` and `false`/`off`/`0`
    pub fn flag(&self, name: &str) -> AppResult<Option<bool>> {
        match self.text(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(None),
            Some("true" | "on" | "1") => Ok(Some(true)),
            Some("false" | "off" | "0") => Ok(Some(false)),
            Some(_) => Err(AppError::Validation(format!("{}: invalid value", name))),
        }
    }

    /// Ids sent either as repeated fields or comma separated
    pub fn ids(&self, name: &str) -> AppResult<Option<Vec<i32>>> {
        let Some(values) = self.fields.get(name) else {
            return Ok(None);
        };

        values
            .iter()
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| AppError::Validation(format!("{}: invalid id {}", name, value)))
            })
            .collect::<AppResult<Vec<i32>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_text_skips_blank() {
        let form = FormData::from_pairs(&[("title", "  Dune "), ("flair", "  ")]);
        assert_eq!(form.text("title").as_deref(), Some("Dune"));
        assert_eq!(form.text("flair"), None);
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn test_parse_values() {
        let form = FormData::from_pairs(&[("inventory", "3"), ("rental_price", "4.50"), ("bad", "x")]);
        assert_eq!(form.parse::<i32>("inventory").unwrap(), Some(3));
        assert_eq!(
            form.parse::<Decimal>("rental_price").unwrap(),
            Some(Decimal::new(450, 2))
        );
        assert!(form.parse::<i32>("bad").is_err());
        assert_eq!(form.parse::<i32>("missing").unwrap(), None);
    }

    #[test]
    fn test_flag() {
        let form = FormData::from_pairs(&[("a", "on"), ("b", "False"), ("c", "maybe")]);
        assert_eq!(form.flag("a").unwrap(), Some(true));
        assert_eq!(form.flag("b").unwrap(), Some(false));
        assert!(form.flag("c").is_err());
    }

    #[test]
    fn test_ids_repeated_or_comma_separated() {
        let form = FormData::from_pairs(&[("categories", "1, 2"), ("categories", "5")]);
        assert_eq!(form.ids("categories").unwrap(), Some(vec![1, 2, 5]));

        let form = FormData::from_pairs(&[("categories", "")]);
        assert_eq!(form.ids("categories").unwrap(), Some(vec![]));

        let form = FormData::from_pairs(&[("categories", "1,x")]);
        assert!(form.ids("categories").is_err());
        assert_eq!(FormData::default().ids("categories").unwrap(), None);
    }
}
