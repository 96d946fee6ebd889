//! Kidsguide HTTP client implementation.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use kidsguide_core::{PaidTier, SessionState, UserId, VenueId};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, CleanupSummary, CurrentUser, EntitlementView, HealthStatus,
    OpenSessionRequest, PaymentIntent, RefreshRequest, RefreshedTokens, RegisterVenueRequest,
    SessionStateResponse, SessionTokens, SetTariffRequest, SweepSummary, TariffHistory,
    UpgradeRequest,
};

/// Kidsguide API client.
///
/// User-facing calls take the caller's access token. Service, admin and cron
/// calls use the credentials from [`ClientOptions`].
#[derive(Debug, Clone)]
pub struct KidsguideClient {
    client: Client,
    base_url: String,
    service_api_key: Option<String>,
    admin_api_key: Option<String>,
    cron_secret: Option<String>,
}

impl KidsguideClient {
    /// Create a client without service credentials.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_api_key: options.service_api_key,
            admin_api_key: options.admin_api_key,
            cron_secret: options.cron_secret,
        })
    }

    /// Check service health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let request = self.client.get(self.url("/health"));
        Self::send(request).await
    }

    /// Open a session for a user whose credentials were already verified.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` without a service API key, or an
    /// error if the request fails.
    pub async fn open_session(&self, user_id: UserId) -> Result<SessionTokens, ClientError> {
        let key = required(self.service_api_key.as_deref(), "service API key")?;
        let request = self
            .client
            .post(self.url("/v1/auth/sessions"))
            .header("x-api-key", key)
            .json(&OpenSessionRequest { user_id });
        Self::send(request).await
    }

    /// Mint a new access token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthenticated` once the session has ended.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ClientError> {
        let request = self
            .client
            .post(self.url("/v1/auth/refresh"))
            .json(&RefreshRequest { refresh_token });
        Self::send(request).await
    }

    /// End the session behind `token` (access or refresh).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url("/v1/auth/logout"))
            .bearer_auth(token);
        Self::send_empty(request).await
    }

    /// End every session of the token's user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn logout_everywhere(&self, access_token: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url("/v1/auth/logout-all"))
            .bearer_auth(access_token);
        Self::send_empty(request).await
    }

    /// Get the user behind an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn me(&self, access_token: &str) -> Result<CurrentUser, ClientError> {
        let request = self
            .client
            .get(self.url("/v1/auth/me"))
            .bearer_auth(access_token);
        Self::send(request).await
    }

    /// Where the session behind an access token stands.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn session_state(&self, access_token: &str) -> Result<SessionState, ClientError> {
        let request = self
            .client
            .get(self.url("/v1/auth/state"))
            .bearer_auth(access_token);
        let response: SessionStateResponse = Self::send(request).await?;
        Ok(response.state)
    }

    /// Get a venue's current tariff.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn get_tariff(
        &self,
        access_token: &str,
        venue_id: VenueId,
    ) -> Result<EntitlementView, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/venues/{venue_id}/tariff")))
            .bearer_auth(access_token);
        Self::send(request).await
    }

    /// List a venue's tariff periods.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    pub async fn get_history(
        &self,
        access_token: &str,
        venue_id: VenueId,
    ) -> Result<TariffHistory, ClientError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/venues/{venue_id}/tariff/history")))
            .bearer_auth(access_token);
        Self::send(request).await
    }

    /// Price an upgrade.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 400 for an invalid duration.
    pub async fn request_upgrade(
        &self,
        access_token: &str,
        venue_id: VenueId,
        tier: PaidTier,
        duration_days: i64,
    ) -> Result<PaymentIntent, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/venues/{venue_id}/tariff/upgrade")))
            .bearer_auth(access_token)
            .json(&UpgradeRequest { tier, duration_days });
        Self::send(request).await
    }

    /// Register a venue on the FREE tier.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` without an admin API key, or
    /// `ClientError::Api` with status 409 if the venue exists.
    pub async fn register_venue(&self, venue_id: VenueId) -> Result<EntitlementView, ClientError> {
        let key = required(self.admin_api_key.as_deref(), "admin API key")?;
        let request = self
            .client
            .post(self.url("/v1/admin/venues"))
            .header("x-admin-key", key)
            .json(&RegisterVenueRequest { venue_id });
        Self::send(request).await
    }

    /// Apply a confirmed tier change.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` without an admin API key, or
    /// `ClientError::NotFound` for an unknown venue.
    pub async fn set_tariff(
        &self,
        venue_id: VenueId,
        change: &SetTariffRequest,
    ) -> Result<EntitlementView, ClientError> {
        let key = required(self.admin_api_key.as_deref(), "admin API key")?;
        let request = self
            .client
            .put(self.url(&format!("/v1/admin/venues/{venue_id}/tariff")))
            .header("x-admin-key", key)
            .json(change);
        Self::send(request).await
    }

    /// Trigger one tariff sweep.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unavailable` if the service cannot list venues.
    pub async fn run_tariff_sweep(&self) -> Result<SweepSummary, ClientError> {
        let secret = required(self.cron_secret.as_deref(), "cron secret")?;
        let request = self
            .client
            .post(self.url("/internal/cron/tariffs"))
            .bearer_auth(secret);
        let summary: SweepSummary = Self::send(request).await?;
        if !summary.errors.is_empty() {
            tracing::warn!(failed = summary.errors.len(), "Tariff sweep reported venue failures");
        }
        Ok(summary)
    }

    /// Trigger one session cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn cleanup_sessions(&self) -> Result<CleanupSummary, ClientError> {
        let secret = required(self.cron_secret.as_deref(), "cron secret")?;
        let request = self
            .client
            .post(self.url("/internal/cron/sessions"))
            .bearer_auth(secret);
        Self::send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }
        Err(Self::error_from(status, response).await)
    }

    async fn send_empty(request: RequestBuilder) -> Result<(), ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_from(status, response).await)
    }

    /// Convert an error response into a typed error.
    async fn error_from(status: StatusCode, response: reqwest::Response) -> ClientError {
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let body = api_error.error;
                match (status, body.code.as_str()) {
                    (StatusCode::UNAUTHORIZED, _) => {
                        let reason = body
                            .details
                            .as_ref()
                            .and_then(|d| d.get("reason"))
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("unauthorized")
                            .to_string();
                        ClientError::Unauthenticated { reason }
                    }
                    (StatusCode::SERVICE_UNAVAILABLE, _) => ClientError::Unavailable,
                    (_, "not_found") => ClientError::NotFound(body.message),
                    (_, code) => ClientError::Api {
                        code: code.to_string(),
                        message: body.message,
                        status: status.as_u16(),
                    },
                }
            }
            Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => ClientError::Unavailable,
            Err(_) => ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            },
        }
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, ClientError> {
    value.ok_or_else(|| ClientError::Configuration(format!("{what} not configured")))
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Key for opening sessions on behalf of users.
    pub service_api_key: Option<String>,
    /// Key for venue administration.
    pub admin_api_key: Option<String>,
    /// Secret for triggering the periodic jobs.
    pub cron_secret: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_api_key: None,
            admin_api_key: None,
            cron_secret: None,
        }
    }
}
