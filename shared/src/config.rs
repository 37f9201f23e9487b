use tracing::warn;

/// Runtime configuration, sourced from `SHELF_*` environment variables.
pub struct Config {
    pub data_dir: String,
    pub namespace: String,
    pub fresh_window_secs: u64,
    pub hard_expiry_secs: u64,
    pub max_bytes: Option<u64>,
    pub cleanup_interval_secs: u64,
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            warn!("{name} is not a number, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_NAMESPACE: &str = "listings";
    const DEFAULT_FRESH_WINDOW_SECS: u64 = 3_600;
    const DEFAULT_HARD_EXPIRY_SECS: u64 = 86_400;
    const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3_600;

    pub fn from_env() -> Self {
        let max_bytes = match std::env::var("SHELF_MAX_BYTES") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("SHELF_MAX_BYTES is not a number, running without a quota");
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            data_dir: std::env::var("SHELF_DATA_DIR")
                .unwrap_or_else(|_| Self::DEFAULT_DATA_DIR.to_string()),
            namespace: std::env::var("SHELF_NAMESPACE")
                .unwrap_or_else(|_| Self::DEFAULT_NAMESPACE.to_string()),
            fresh_window_secs: env_u64("SHELF_FRESH_WINDOW_SECS", Self::DEFAULT_FRESH_WINDOW_SECS),
            hard_expiry_secs: env_u64("SHELF_HARD_EXPIRY_SECS", Self::DEFAULT_HARD_EXPIRY_SECS),
            max_bytes,
            cleanup_interval_secs: env_u64(
                "SHELF_CLEANUP_INTERVAL_SECS",
                Self::DEFAULT_CLEANUP_INTERVAL_SECS,
            ),
        }
    }
}
