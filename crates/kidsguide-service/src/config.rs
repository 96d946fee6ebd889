//! Service configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::Deserialize;

use kidsguide_core::tariff::{DEFAULT_GRACE_PERIOD_DAYS, DEFAULT_RENEWAL_PERIOD_DAYS};
use kidsguide_core::TariffPolicy;

use crate::tokens::TokenSettings;

/// Which storage backend the binary opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local store; data is lost on restart.
    Memory,
    /// PostgreSQL at `DATABASE_URL`.
    Postgres,
    /// `RocksDB` under `DATA_DIR` (needs the `rocksdb-backend` feature).
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
            Self::RocksDb => "rocksdb",
        })
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: memory).
    pub storage_backend: StorageBackend,

    /// PostgreSQL connection string.
    pub database_url: Option<String>,

    /// Path to the `RocksDB` data directory (default: "/data/kidsguide").
    pub data_dir: String,

    /// HS256 signing secret for access and refresh tokens.
    pub jwt_secret: String,

    /// Shared secret for the cron trigger endpoints.
    pub cron_secret: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Service API key used by the identity service to open sessions.
    pub service_api_key: Option<String>,

    /// Deployment environment; cookies are `Secure` in "production".
    pub environment: String,

    /// Access token lifetime in seconds (default: 1 hour).
    pub access_token_ttl_seconds: i64,

    /// Refresh token and session lifetime in seconds (default: 7 days).
    pub refresh_token_ttl_seconds: i64,

    /// Accept signed access tokens when the session store is unreachable.
    pub availability_over_strict_revocation: bool,

    /// Cross-check access tokens against the session store.
    pub verify_access_sessions: bool,

    /// Issue a new refresh token on every refresh.
    pub rotate_refresh_tokens: bool,

    /// Number of venues a sweep phase processes concurrently.
    pub sweep_concurrency: usize,

    /// Grace window in days after a non-renewing period lapses.
    pub grace_period_days: i64,

    /// Length of an automatic renewal in days.
    pub renewal_period_days: i64,

    /// Run the tariff sweep in-process on this interval.
    pub tariff_sweep_interval_seconds: Option<u64>,

    /// Run session cleanup in-process on this interval.
    pub session_cleanup_interval_seconds: Option<u64>,

    /// Currency code used in payment intents.
    pub currency: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Auth secrets file structure.
#[derive(Debug, Deserialize)]
struct AuthSecrets {
    jwt_secret: String,
    #[serde(default)]
    cron_secret: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
    #[serde(default)]
    service_api_key: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secrets = load_auth_secrets();

        let storage_backend = match env_var("STORAGE_BACKEND").map(|s| s.parse()) {
            Some(Ok(backend)) => backend,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Falling back to the memory backend");
                StorageBackend::Memory
            }
            None => defaults.storage_backend,
        };

        let jwt_secret = secrets
            .as_ref()
            .map(|s| s.jwt_secret.clone())
            .or_else(|| env_var("JWT_SECRET"))
            .unwrap_or_else(|| {
                tracing::warn!("JWT_SECRET not set - using a random secret, sessions will not survive restarts");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            });

        let secret = |pick: fn(&AuthSecrets) -> Option<String>, key: &str| {
            secrets.as_ref().and_then(pick).or_else(|| env_var(key))
        };

        Self {
            listen_addr: env_var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            storage_backend,
            database_url: env_var("DATABASE_URL"),
            data_dir: env_var("DATA_DIR").unwrap_or(defaults.data_dir),
            jwt_secret,
            cron_secret: secret(|s| s.cron_secret.clone(), "CRON_SECRET"),
            admin_api_key: secret(|s| s.admin_api_key.clone(), "ADMIN_API_KEY"),
            service_api_key: secret(|s| s.service_api_key.clone(), "SERVICE_API_KEY"),
            environment: env_var("ENVIRONMENT").unwrap_or(defaults.environment),
            access_token_ttl_seconds: env_parse("ACCESS_TOKEN_TTL_SECONDS")
                .unwrap_or(defaults.access_token_ttl_seconds),
            refresh_token_ttl_seconds: env_parse("REFRESH_TOKEN_TTL_SECONDS")
                .unwrap_or(defaults.refresh_token_ttl_seconds),
            availability_over_strict_revocation: env_parse("AVAILABILITY_OVER_STRICT_REVOCATION")
                .unwrap_or(defaults.availability_over_strict_revocation),
            verify_access_sessions: env_parse("VERIFY_ACCESS_SESSIONS")
                .unwrap_or(defaults.verify_access_sessions),
            rotate_refresh_tokens: env_parse("ROTATE_REFRESH_TOKENS")
                .unwrap_or(defaults.rotate_refresh_tokens),
            sweep_concurrency: env_parse("SWEEP_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.sweep_concurrency),
            grace_period_days: env_parse("GRACE_PERIOD_DAYS").unwrap_or(defaults.grace_period_days),
            renewal_period_days: env_parse("RENEWAL_PERIOD_DAYS")
                .unwrap_or(defaults.renewal_period_days),
            tariff_sweep_interval_seconds: env_parse("TARIFF_SWEEP_INTERVAL_SECONDS")
                .filter(|n| *n > 0),
            session_cleanup_interval_seconds: env_parse("SESSION_CLEANUP_INTERVAL_SECONDS")
                .filter(|n| *n > 0),
            currency: env_var("CURRENCY").unwrap_or(defaults.currency),
            cors_origins: env_var("CORS_ORIGINS")
                .unwrap_or_else(|| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Token lifecycle settings derived from this configuration.
    #[must_use]
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_ttl: Duration::seconds(self.access_token_ttl_seconds),
            refresh_ttl: Duration::seconds(self.refresh_token_ttl_seconds),
            availability_over_strict_revocation: self.availability_over_strict_revocation,
            verify_access_sessions: self.verify_access_sessions,
            rotate_refresh_tokens: self.rotate_refresh_tokens,
        }
    }

    /// Tariff transition policy derived from this configuration.
    #[must_use]
    pub fn tariff_policy(&self) -> TariffPolicy {
        TariffPolicy::from_days(self.grace_period_days, self.renewal_period_days)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|s| s.trim().parse().ok())
}

/// Load auth secrets from file, if one is present.
fn load_auth_secrets() -> Option<AuthSecrets> {
    let secret_paths = [
        ".secrets/auth.json",
        "kidsguide/.secrets/auth.json",
        "../.secrets/auth.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AuthSecrets>(path) {
            tracing::info!(path = %path, "Loaded auth secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Auth secrets file not found, using environment variables");
    None
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            data_dir: "/data/kidsguide".into(),
            jwt_secret: "development-only-secret".into(),
            cron_secret: None,
            admin_api_key: None,
            service_api_key: None,
            environment: "development".into(),
            access_token_ttl_seconds: 60 * 60,
            refresh_token_ttl_seconds: 7 * 24 * 60 * 60,
            availability_over_strict_revocation: true,
            verify_access_sessions: true,
            rotate_refresh_tokens: false,
            sweep_concurrency: 8,
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            renewal_period_days: DEFAULT_RENEWAL_PERIOD_DAYS,
            tariff_sweep_interval_seconds: None,
            session_cleanup_interval_seconds: None,
            currency: "RUB".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_aliases() {
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("postgresql".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert_eq!("rocks".parse::<StorageBackend>().unwrap(), StorageBackend::RocksDb);
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn defaults_match_documented_lifetimes() {
        let config = ServiceConfig::default();
        let settings = config.token_settings();
        assert_eq!(settings.access_ttl, Duration::hours(1));
        assert_eq!(settings.refresh_ttl, Duration::days(7));
        assert!(settings.availability_over_strict_revocation);
        assert!(!settings.rotate_refresh_tokens);
        assert_eq!(config.tariff_policy(), TariffPolicy::default());
        assert!(!config.is_production());
    }
}
