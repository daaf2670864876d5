//! DriftLog server binary.
//!
//! Opens (or recovers) a commit log in the configured directory and serves
//! the JSON produce/consume API over HTTP.
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! DRIFT_DATA_DIR         Log directory               (default: "data/log")
//! DRIFT_ADDR             Listen address              (default: "127.0.0.1:8080")
//! DRIFT_MAX_STORE_BYTES  Store bytes per segment     (default: 0 = 1 MiB)
//! DRIFT_MAX_INDEX_BYTES  Index bytes per segment     (default: 0 = 1 MiB)
//! DRIFT_INITIAL_OFFSET   First offset of a fresh log (default: 0)
//! ```

use anyhow::Result;
use log::{Config, Log};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let data_dir = env_or("DRIFT_DATA_DIR", "data/log");
    let addr = env_or("DRIFT_ADDR", "127.0.0.1:8080");
    let max_store_bytes: u64 = env_or("DRIFT_MAX_STORE_BYTES", "0").parse().unwrap_or(0);
    let max_index_bytes: u64 = env_or("DRIFT_MAX_INDEX_BYTES", "0").parse().unwrap_or(0);
    let initial_offset: u64 = env_or("DRIFT_INITIAL_OFFSET", "0").parse().unwrap_or(0);

    let config = Config::default()
        .with_max_store_bytes(max_store_bytes)
        .with_max_index_bytes(max_index_bytes)
        .with_initial_offset(initial_offset);

    let log = Log::open(&data_dir, config)?;
    let lowest = log.lowest_offset()?;
    let next = match log.highest_offset() {
        Ok(highest) => highest + 1,
        Err(_) => lowest,
    };
    info!(%data_dir, lowest, next, "log opened");

    let app = server::router(Arc::new(log));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "driftlog server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
