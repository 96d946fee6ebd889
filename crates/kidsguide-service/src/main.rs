//! Kidsguide Service - venue tariffs and login sessions
//!
//! This is the main entry point for the kidsguide service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kidsguide_service::jobs::spawn_schedules;
use kidsguide_service::{create_router, AppState, ServiceConfig, StorageBackend};
use kidsguide_store::{MemoryStore, PgStore, Store};

/// Connections in the PostgreSQL pool.
const PG_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kidsguide=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kidsguide Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        storage_backend = %config.storage_backend,
        environment = %config.environment,
        rotate_refresh_tokens = config.rotate_refresh_tokens,
        availability_over_strict_revocation = config.availability_over_strict_revocation,
        sweep_interval = ?config.tariff_sweep_interval_seconds,
        cleanup_interval = ?config.session_cleanup_interval_seconds,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;

    // Build app state
    let state = AppState::new(store, config.clone());
    let _schedules = spawn_schedules(&Arc::new(state.clone()));

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for the postgres backend")?;
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(url, PG_MAX_CONNECTIONS).await?;
            store.migrate().await?;
            tracing::info!("PostgreSQL migrations applied");
            Ok(Arc::new(store))
        }
        StorageBackend::RocksDb => open_rocks(config),
    }
}

#[cfg(feature = "rocksdb-backend")]
fn open_rocks(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(kidsguide_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_rocks(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    Err("this binary was built without the rocksdb-backend feature".into())
}
