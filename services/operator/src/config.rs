use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub namespace: String,
    pub manifest: Option<PathBuf>,
    pub resync_interval: Duration,
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let log_level = var("VTO_LOG_LEVEL", "info");

        let namespace = var("VTO_NAMESPACE", "default");

        let manifest = lookup("VTO_MANIFEST")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let resync_secs: u64 = var("VTO_RESYNC_INTERVAL_SECS", "300")
            .parse()
            .context("VTO_RESYNC_INTERVAL_SECS must be a whole number of seconds")?;
        ensure!(resync_secs > 0, "VTO_RESYNC_INTERVAL_SECS must be greater than zero");

        let backoff_base_ms: u64 = var("VTO_ERROR_BACKOFF_BASE_MS", "500")
            .parse()
            .context("VTO_ERROR_BACKOFF_BASE_MS must be a whole number of milliseconds")?;
        ensure!(backoff_base_ms > 0, "VTO_ERROR_BACKOFF_BASE_MS must be greater than zero");

        let backoff_max_secs: u64 = var("VTO_ERROR_BACKOFF_MAX_SECS", "300")
            .parse()
            .context("VTO_ERROR_BACKOFF_MAX_SECS must be a whole number of seconds")?;

        let error_backoff_base = Duration::from_millis(backoff_base_ms);
        let error_backoff_max = Duration::from_secs(backoff_max_secs);
        ensure!(
            error_backoff_max >= error_backoff_base,
            "VTO_ERROR_BACKOFF_MAX_SECS must not be below VTO_ERROR_BACKOFF_BASE_MS"
        );

        Ok(Self {
            log_level,
            namespace,
            manifest,
            resync_interval: Duration::from_secs(resync_secs),
            error_backoff_base,
            error_backoff_max,
        })
    }
}
