//! Common test utilities for kidsguide integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::{Arc, Mutex};

use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use kidsguide_core::{UserId, VenueId};
use kidsguide_service::{create_router, AppState, ServiceConfig};
use kidsguide_store::{MemoryStore, Store};

/// Tokens returned when a session is opened.
pub struct LoginTokens {
    /// Access token.
    pub access: String,
    /// Refresh token.
    pub refresh: String,
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for seeding and fault injection.
    pub store: Arc<MemoryStore>,
    /// Controlled clock read by every handler.
    pub clock: Arc<Mutex<DateTime<Utc>>>,
    /// A test user ID.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The admin API key.
    pub admin_api_key: String,
    /// The cron trigger secret.
    pub cron_secret: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh store.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(Mutex::new(Utc::now()));

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();
        let cron_secret = "test-cron-secret".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: "test-jwt-secret".into(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            cron_secret: Some(cron_secret.clone()),
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let clock_source = Arc::clone(&clock);
        let state = AppState::new(store.clone(), config)
            .with_clock(Arc::new(move || *clock_source.lock().unwrap()));
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            clock,
            test_user_id: UserId::generate(),
            service_api_key,
            admin_api_key,
            cron_secret,
        }
    }

    /// The harness clock.
    pub fn now(&self) -> DateTime<Utc> {
        *self.clock.lock().unwrap()
    }

    /// Move the harness clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.clock.lock().unwrap();
        *now += by;
    }

    /// Bearer header carrying the cron secret.
    pub fn cron_auth_header(&self) -> String {
        format!("Bearer {}", self.cron_secret)
    }

    /// Open a session for the test user through the API.
    pub async fn login(&self) -> LoginTokens {
        self.login_as(self.test_user_id).await
    }

    /// Open a session for `user_id` through the API.
    pub async fn login_as(&self, user_id: UserId) -> LoginTokens {
        let response = self
            .server
            .post("/v1/auth/sessions")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&json!({ "userId": user_id.to_string() }))
            .await;
        assert_eq!(response.status_code(), 201);

        let body: serde_json::Value = response.json();
        LoginTokens {
            access: body["accessToken"].as_str().unwrap().to_string(),
            refresh: body["refreshToken"].as_str().unwrap().to_string(),
        }
    }

    /// Bearer header for an access token.
    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    /// Register a FREE venue through the admin API.
    pub async fn register_venue(&self) -> VenueId {
        let venue_id = VenueId::generate();
        let response = self
            .server
            .post("/v1/admin/venues")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&json!({ "venueId": venue_id.to_string() }))
            .await;
        assert_eq!(response.status_code(), 201);
        venue_id
    }

    /// Apply a confirmed tier change through the admin API.
    pub async fn set_tariff(&self, venue_id: VenueId, body: serde_json::Value) -> serde_json::Value {
        let response = self
            .server
            .put(&format!("/v1/admin/venues/{venue_id}/tariff"))
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&body)
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Number of ledger entries stored for a venue.
    pub async fn store_history_len(&self, venue_id: VenueId) -> usize {
        self.store.list_history(&venue_id).await.unwrap().len()
    }

    /// Trigger one tariff sweep through the cron endpoint.
    pub async fn sweep(&self) -> serde_json::Value {
        let response = self
            .server
            .post("/internal/cron/tariffs")
            .add_header("authorization", self.cron_auth_header())
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
