//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{accounts, books, categories, health, payments, reviews};
use crate::models;

/// Registers the bearer JWT scheme referenced by `security(("bearer_auth" = []))`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FFLO API",
        version = "0.4.0",
        description = "Library rental REST API: catalog, memberships, rentals and payments",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Accounts
        accounts::register,
        accounts::register_staff,
        accounts::login,
        accounts::logout,
        accounts::me,
        accounts::update_profile,
        accounts::change_password,
        accounts::request_password_reset,
        accounts::verify_reset_code,
        accounts::reset_password,
        accounts::list_users,
        accounts::get_user,
        // Memberships
        accounts::membership_info,
        accounts::create_membership,
        accounts::advance_membership,
        accounts::deactivate_membership,
        accounts::reset_quota,
        // Books
        books::list_books,
        books::get_book,
        books::get_book_full,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::set_archived,
        books::set_categories,
        books::add_bookmark,
        books::remove_bookmark,
        books::list_bookmarks,
        books::rate_book,
        // Rentals
        books::place_hold,
        books::remove_hold,
        books::reserve,
        books::cancel_reservation,
        books::activate,
        books::return_book,
        // Categories
        categories::list_categories,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        categories::reorder_categories,
        // Reviews
        reviews::list_reviews,
        reviews::create_review,
        // Payments
        payments::create_intent,
        payments::webhook,
        payments::checkout,
        payments::finalize,
    ),
    components(
        schemas(
            // Accounts
            models::user::User,
            models::user::UserImage,
            models::user::UserSummary,
            models::user::UserInfo,
            models::user::UserDetail,
            models::user::RegisterRequest,
            models::user::LoginRequest,
            models::user::LoginResponse,
            models::user::PasswordChangeRequest,
            models::user::PasswordResetRequest,
            models::user::PasswordResetVerify,
            models::user::PasswordResetConfirm,
            // Memberships
            models::membership::Membership,
            models::membership::MembershipDetails,
            models::membership::MembershipInfo,
            models::membership::CreateMembership,
            models::membership::QuotaResetResponse,
            // Books
            models::book::Book,
            models::book::BookImage,
            models::book::BookDetails,
            models::book::BookFull,
            models::book::BookSummary,
            models::book::ArchiveRequest,
            models::book::BookCategoriesRequest,
            models::rating::Bookmark,
            models::rating::RatingRequest,
            models::rating::RatingResponse,
            // Rentals
            models::rental::BookRental,
            models::rental::BookHold,
            models::rental::RentalWithBook,
            models::rental::RentalWithUser,
            models::rental::HoldWithBook,
            models::rental::BorrowerRequest,
            models::rental::LedgerResponse,
            // Categories
            models::category::Category,
            models::category::CreateCategory,
            models::category::UpdateCategory,
            models::category::ReorderCategories,
            // Reviews
            models::review::Review,
            models::review::CreateReview,
            // Payments
            models::payment::PaymentSummary,
            models::payment::CreateIntentRequest,
            models::payment::CreateIntentResponse,
            models::payment::CartItemType,
            models::payment::CartItem,
            models::payment::CheckoutRequest,
            models::payment::CheckoutResponse,
            models::payment::FinalizeRequest,
            models::payment::FinalizeResponse,
            crate::ledger::QuoteLine,
            // Common
            models::MessageResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "accounts", description = "Registration, sessions and profiles"),
        (name = "memberships", description = "Memberships and monthly quotas"),
        (name = "books", description = "Catalog, bookmarks and ratings"),
        (name = "rentals", description = "Holds, reservations and returns"),
        (name = "categories", description = "Book categories"),
        (name = "reviews", description = "Guest book"),
        (name = "payments", description = "Payments and checkout")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_ledger_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/books/{id}/reserve"));
        assert!(doc.paths.paths.contains_key("/payments/webhook"));
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth")));
    }
}
