//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, cron, health, sessions, venues};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent cron triggers; a second sweep would only re-check guards.
const CRON_MAX_CONCURRENT_REQUESTS: usize = 2;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Cron (Bearer cron secret)
/// - `POST /internal/cron/tariffs` - Run one tariff sweep
/// - `POST /internal/cron/sessions` - Delete expired sessions
///
/// ## Sessions
/// - `POST /v1/auth/sessions` - Open a session (service API key)
/// - `POST /v1/auth/refresh` - Refresh the access token (refresh token)
/// - `POST /v1/auth/logout` - End the current session
/// - `POST /v1/auth/logout-all` - End all sessions of the user (session auth)
/// - `GET /v1/auth/me` - Current user (session auth)
/// - `GET /v1/auth/state` - Where the presented tokens stand
///
/// ## Venues (session auth)
/// - `GET /v1/venues/:venue_id/tariff` - Current tariff view
/// - `GET /v1/venues/:venue_id/tariff/history` - Tariff periods
/// - `POST /v1/venues/:venue_id/tariff/upgrade` - Quote an upgrade
///
/// ## Admin (admin API key)
/// - `POST /v1/admin/venues` - Register a venue
/// - `PUT /v1/admin/venues/:venue_id/tariff` - Apply a confirmed tier change
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let cron_routes = Router::new()
        .route("/tariffs", post(cron::run_tariff_sweep))
        .route("/sessions", post(cron::run_session_cleanup))
        .layer(ConcurrencyLimitLayer::new(CRON_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Sessions
        .route("/auth/sessions", post(sessions::create_session))
        .route("/auth/refresh", post(sessions::refresh))
        .route("/auth/logout", post(sessions::logout))
        .route("/auth/logout-all", post(sessions::logout_everywhere))
        .route("/auth/me", get(sessions::me))
        .route("/auth/state", get(sessions::session_state))
        // Venues
        .route("/venues/:venue_id/tariff", get(venues::get_tariff))
        .route("/venues/:venue_id/tariff/history", get(venues::get_history))
        .route("/venues/:venue_id/tariff/upgrade", post(venues::request_upgrade))
        // Admin
        .route("/admin/venues", post(admin::register_venue))
        .route("/admin/venues/:venue_id/tariff", put(admin::set_tariff))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/internal/cron", cron_routes)
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
