//! popsentry -- anomaly detection for monthly popularity counters.
//!
//! This crate reads monthly package, mirror, country and architecture
//! counters and flags growth anomalies, brand-new high-volume entities,
//! correlated increments and base-package outliers for human review.

pub mod api;
pub mod config;
pub mod detect;
pub mod month;
pub mod storage;

use anyhow::Result;

use crate::config::Config;

/// Start the admin report API.
pub async fn serve(bind: &str, config: &Config) -> Result<()> {
    // 1. Initialize Storage
    let db_path = config.database.path.display().to_string();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    // 2. Build shared state
    let state = api::state::AppState {
        pool,
        thresholds: config.thresholds,
        expected_packages: config.base_packages.expected.clone(),
    };

    // 3. Start API Server
    let addr: std::net::SocketAddr = bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "popsentry listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
