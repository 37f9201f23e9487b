use chrono::TimeDelta;
use shared::config::Config;
use shelf::{CacheSettings, ProductCache};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storage_engine::SledStore;
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting shelf maintenance daemon");

    // Load environment variables
    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();

    let store = Arc::new(SledStore::with_quota(
        Path::new(&config.data_dir).join("shelf.sled"),
        config.max_bytes,
    )?);

    let settings = CacheSettings::new(
        config.namespace.clone(),
        TimeDelta::seconds(config.fresh_window_secs as i64),
        TimeDelta::seconds(config.hard_expiry_secs as i64),
    );

    // Products are opaque to maintenance; the sweep only reads timestamps.
    let cache: ProductCache<serde_json::Value> = ProductCache::new(store, settings);

    info!(
        namespace = %config.namespace,
        interval_secs = config.cleanup_interval_secs,
        "Running periodic expiry sweeps"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.cleanup_interval_secs));
    loop {
        ticker.tick().await;
        match cache.cleanup() {
            Ok(removed) => info!(removed, "Expiry sweep finished"),
            Err(e) => error!("Expiry sweep failed: {e}"),
        }
    }
}
