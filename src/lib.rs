//! FFLO Library Rental Server
//!
//! REST JSON API for a small lending library: a book catalog, memberships
//! with a monthly free-book quota, holds and rentals, and card payments.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
