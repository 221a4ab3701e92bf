//! FFLO Server - Library Rental System
//!
//! REST API server for the FFLO lending library.

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fflo_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::{redis::RedisService, Services},
    AppState,
};

/// Largest accepted request body, multipart uploads included
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keeps the file writer flushing until shutdown
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting FFLO Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let redis_service = RedisService::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    tracing::info!("Connected to Redis");

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config, redis_service)
        .await
        .context("Failed to create services")?;

    if let Some(admin) = &config.admin {
        services
            .users
            .ensure_admin(admin)
            .await
            .context("Failed to create the staff account")?;
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state)?;

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // the rate limiter keys on the peer address
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Install the tracing subscriber; the guard must outlive the server
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fflo_server={},tower_http=debug", config.level).into());

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "fflo-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    guard
}

/// Create the application router with all routes
fn create_router(state: AppState) -> anyhow::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Login and password reset are throttled per client address
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(state.config.rate_limit.per_second)
            .burst_size(state.config.rate_limit.burst_size)
            .finish()
            .context("Invalid rate limiter configuration")?,
    );
    let limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    let throttled = Router::new()
        .route("/accounts/login", post(api::accounts::login))
        .route("/accounts/password/reset/request", post(api::accounts::request_password_reset))
        .route("/accounts/password/reset/verify", post(api::accounts::verify_reset_code))
        .route("/accounts/password/reset", post(api::accounts::reset_password))
        .layer(GovernorLayer { config: governor_conf });

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Accounts
        .route("/accounts/register", post(api::accounts::register))
        .route("/accounts/register/staff", post(api::accounts::register_staff))
        .route("/accounts/logout", post(api::accounts::logout))
        .route("/accounts/me", get(api::accounts::me))
        .route("/accounts/profile", put(api::accounts::update_profile))
        .route("/accounts/password/change", post(api::accounts::change_password))
        .route("/accounts/users", get(api::accounts::list_users))
        .route("/accounts/users/reset-quota", post(api::accounts::reset_quota))
        .route("/accounts/users/:id", get(api::accounts::get_user))
        // Memberships
        .route("/accounts/membership", get(api::accounts::membership_info))
        .route("/accounts/membership", post(api::accounts::create_membership))
        .route("/accounts/memberships/:id/advance", post(api::accounts::advance_membership))
        .route("/accounts/memberships/:id/deactivate", post(api::accounts::deactivate_membership))
        // Books
        .route("/books", get(api::books::list_books))
        .route("/books", post(api::books::create_book))
        .route("/books/:id", get(api::books::get_book))
        .route("/books/:id", put(api::books::update_book))
        .route("/books/:id", delete(api::books::delete_book))
        .route("/books/:id/full", get(api::books::get_book_full))
        .route("/books/:id/archive", put(api::books::set_archived))
        .route("/books/:id/categories", put(api::books::set_categories))
        .route("/books/:id/bookmark", post(api::books::add_bookmark))
        .route("/books/:id/bookmark", delete(api::books::remove_bookmark))
        .route("/books/:id/rating", post(api::books::rate_book))
        .route("/bookmarks", get(api::books::list_bookmarks))
        // Rentals
        .route("/books/:id/hold", post(api::books::place_hold))
        .route("/books/:id/hold", delete(api::books::remove_hold))
        .route("/books/:id/reserve", post(api::books::reserve))
        .route("/books/:id/reserve", delete(api::books::cancel_reservation))
        .route("/books/:id/activate", post(api::books::activate))
        .route("/books/:id/return", post(api::books::return_book))
        // Categories
        .route("/categories", get(api::categories::list_categories))
        .route("/categories", post(api::categories::create_category))
        .route("/categories/reorder", put(api::categories::reorder_categories))
        .route("/categories/:id", put(api::categories::update_category))
        .route("/categories/:id", delete(api::categories::delete_category))
        // Reviews
        .route("/reviews", get(api::reviews::list_reviews))
        .route("/reviews", post(api::reviews::create_review))
        // Payments
        .route("/payments/create-intent", post(api::payments::create_intent))
        .route("/payments/webhook", post(api::payments::webhook))
        .route("/payments/checkout", post(api::payments::checkout))
        .route("/payments/checkout/finalize", post(api::payments::finalize))
        .merge(throttled)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    let media = ServeDir::new(&state.config.media.root);

    Ok(Router::new()
        .nest("/api/v1", api_v1)
        .nest_service(&state.config.media.url_prefix, media)
        .merge(api::openapi::create_openapi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        ))
}
