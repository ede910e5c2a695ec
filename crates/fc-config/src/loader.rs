//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "application.toml",
    "engine.toml",
    "./config/config.toml",
    "./config/application.toml",
    "/etc/sms-engine/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("SMS_ENGINE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // HTTP
        if let Ok(val) = env::var("SMS_ENGINE_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_HTTP_HOST") {
            config.http.host = val;
        }

        // Database
        if let Ok(val) = env::var("SMS_ENGINE_DATABASE_URL") {
            config.database.url = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_DATABASE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                config.database.max_connections = n;
            }
        }

        // Redis
        if let Ok(val) = env::var("SMS_ENGINE_REDIS_URL") {
            config.redis.url = val;
        }

        // Provider
        if let Ok(val) = env::var("SMS_ENGINE_PROVIDER_BASE_URL") {
            config.provider.base_url = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_PROVIDER_ACCOUNT_SID") {
            config.provider.account_sid = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_PROVIDER_AUTH_TOKEN") {
            config.provider.auth_token = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_PROVIDER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.provider.timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_PROVIDER_SIGNING_SECRET") {
            config.provider.signing_secret = val;
        }

        // Rate limiter
        if let Ok(val) = env::var("SMS_ENGINE_RATE_LIMITER_TTL_SECONDS") {
            if let Ok(ttl) = val.parse() {
                config.rate_limiter.key_ttl_seconds = ttl;
            }
        }

        // Scheduler
        if let Ok(val) = env::var("SMS_ENGINE_SCHEDULER_ENABLED") {
            config.scheduler.enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("SMS_ENGINE_SCHEDULER_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.scheduler.poll_interval_ms = ms;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_SCHEDULER_STALE_THRESHOLD_MINUTES") {
            if let Ok(m) = val.parse() {
                config.scheduler.stale_threshold_minutes = m;
            }
        }

        // Orchestrator
        if let Ok(val) = env::var("SMS_ENGINE_ORCHESTRATOR_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.orchestrator.poll_interval_ms = ms;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_ORCHESTRATOR_MAX_CONCURRENT_CAMPAIGNS") {
            if let Ok(n) = val.parse() {
                config.orchestrator.max_concurrent_campaigns = n;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_ORCHESTRATOR_CURSOR_PAGE_SIZE") {
            if let Ok(n) = val.parse() {
                config.orchestrator.cursor_page_size = n;
            }
        }

        // Reconciler
        if let Ok(val) = env::var("SMS_ENGINE_RECONCILER_SWEEP_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.reconciler.sweep_interval_ms = ms;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_RECONCILER_ORPHAN_LOOKBACK_MINUTES") {
            if let Ok(m) = val.parse() {
                config.reconciler.orphan_lookback_minutes = m;
            }
        }

        // Lock
        if let Ok(val) = env::var("SMS_ENGINE_LOCK_TTL_SECONDS") {
            if let Ok(ttl) = val.parse() {
                config.lock.lock_ttl_seconds = ttl;
            }
        }
        if let Ok(val) = env::var("SMS_ENGINE_LOCK_HEARTBEAT_INTERVAL_SECONDS") {
            if let Ok(s) = val.parse() {
                config.lock.heartbeat_interval_seconds = s;
            }
        }

        // Webhook
        if let Ok(val) = env::var("SMS_ENGINE_WEBHOOK_SIGNING_SECRET") {
            config.webhook.signing_secret = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_WEBHOOK_REQUIRE_SIGNATURE") {
            config.webhook.require_signature = val.parse().unwrap_or(false);
        }

        // General
        if let Ok(val) = env::var("SMS_ENGINE_DATA_DIR") {
            config.data_dir = val;
        }
        if let Ok(val) = env::var("SMS_ENGINE_DEV_MODE") {
            config.dev_mode = val.parse().unwrap_or(false);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_and_no_env() {
        let loader = ConfigLoader::new();
        let config = loader.load().expect("default load should not fail");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.rate_limiter.key_ttl_seconds, 2);
    }

    #[test]
    fn loads_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[http]\nport = 9090\n").unwrap();

        let loader = ConfigLoader::with_path(&path);
        let config = loader.load().unwrap();
        assert_eq!(config.http.port, 9090);
    }
}
