//! Category model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    /// Display position, 0-based
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 15, message = "Name must be 1-15 characters"))]
    pub name: String,
    #[validate(length(max = 50, message = "Description must be at most 50 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 7, message = "Color must be at most 7 characters"))]
    pub color: Option<String>,
    #[validate(length(max = 50, message = "Icon must be at most 50 characters"))]
    pub icon: Option<String>,
    /// Insert position; appended when absent
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 15, message = "Name must be 1-15 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 50, message = "Description must be at most 50 characters"))]
    pub description: Option<String>,
    #[validate(length(max = 7, message = "Color must be at most 7 characters"))]
    pub color: Option<String>,
    #[validate(length(max = 50, message = "Icon must be at most 50 characters"))]
    pub icon: Option<String>,
}

impl CreateCategory {
    /// Strip surrounding whitespace so validation sees the stored name
    pub fn trimmed(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self
    }
}

impl UpdateCategory {
    pub fn trimmed(mut self) -> Self {
        self.name = self.name.map(|name| name.trim().to_string());
        self
    }
}

/// Complete new ordering of all categories
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderCategories {
    pub ids: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str) -> CreateCategory {
        CreateCategory {
            name: name.to_string(),
            description: None,
            color: None,
            icon: None,
            sort_order: None,
        }
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(create("   ").trimmed().validate().is_err());

        let update = UpdateCategory {
            name: Some("\t ".to_string()),
            description: None,
            color: None,
            icon: None,
        };
        assert!(update.trimmed().validate().is_err());
    }

    #[test]
    fn test_name_is_trimmed() {
        let category = create("  Fantasy ").trimmed();
        assert_eq!(category.name, "Fantasy");
        assert!(category.validate().is_ok());
    }
}
