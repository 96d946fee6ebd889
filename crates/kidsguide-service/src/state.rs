//! Application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use kidsguide_core::TariffPolicy;
use kidsguide_store::Store;

use crate::config::ServiceConfig;
use crate::jobs::tariff_sweep::TariffSweeper;
use crate::tokens::TokenManager;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Tariff transition timings.
    pub policy: TariffPolicy,

    /// Session token lifecycle.
    pub tokens: Arc<TokenManager>,

    /// Tariff sweep runner.
    pub sweeper: Arc<TariffSweeper>,

    clock: Clock,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let policy = config.tariff_policy();
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&store),
            &config.jwt_secret,
            config.token_settings(),
        ));
        let sweeper = Arc::new(TariffSweeper::new(
            Arc::clone(&store),
            policy,
            config.sweep_concurrency,
        ));

        if config.cron_secret.is_none() {
            tracing::warn!("CRON_SECRET not configured - cron endpoints will reject every call");
        }
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - sessions cannot be opened");
        }

        Self {
            store,
            config,
            policy,
            tokens,
            sweeper,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock, e.g. to move time forward in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
