//! Kidsguide HTTP API service.
//!
//! This crate serves venue tariffs and login sessions:
//!
//! - Tariff reads, history and upgrade quotes for venue owners
//! - Payment-confirmed tier changes for operators
//! - Access/refresh token sessions with cookie transport
//! - Cron-triggered tariff sweeps and session cleanup
//!
//! # Authentication
//!
//! 1. **Session tokens** - end-user requests (`session` cookie or bearer)
//! 2. **Service API key** - the identity service opening sessions
//! 3. **Admin API key** - operator endpoints
//! 4. **Cron secret** - the external scheduler

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for the router

pub mod auth;
pub mod config;
pub mod cookies;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod tokens;

pub use config::{ServiceConfig, StorageBackend};
pub use error::ApiError;
pub use jobs::session_cleanup::CleanupSummary;
pub use jobs::tariff_sweep::{SweepPhase, SweepSummary, TariffSweeper, VenueFailure};
pub use routes::create_router;
pub use state::{AppState, Clock};
pub use tokens::{AuthError, TokenManager, TokenSettings};
