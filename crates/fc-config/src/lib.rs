//! Messaging Engine Configuration System
//!
//! TOML-based configuration with environment variable override support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub provider: ProviderConfig,
    pub rate_limiter: RateLimiterConfig,
    pub scheduler: SchedulerConfig,
    pub orchestrator: OrchestratorConfig,
    pub reconciler: ReconcilerConfig,
    pub lock: LockConfig,
    pub webhook: WebhookConfig,

    /// Data directory for local storage (sqlite file, job queue db)
    pub data_dir: String,

    /// Enable development mode
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            provider: ProviderConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            scheduler: SchedulerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            lock: LockConfig::default(),
            webhook: WebhookConfig::default(),
            data_dir: "./data".to_string(),
            dev_mode: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Transactional store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlite:// or postgres:// URL
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/engine.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Redis configuration, backing the distributed rate limiter and advisory locks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Outbound provider adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub timeout_ms: u64,
    pub signing_secret: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9999".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            timeout_ms: 10_000,
            signing_secret: String::new(),
        }
    }
}

/// Distributed rate limiter configuration (§4.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Key TTL in seconds; fixed at 2 by the spec but exposed for tests
    pub key_ttl_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { key_ttl_seconds: 2 }
    }
}

/// Campaign scheduler configuration (§4.9)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub stale_threshold_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 30_000,
            batch_size: 50,
            stale_threshold_minutes: 15,
        }
    }
}

/// Orchestrator worker configuration (§4.10, §5)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_ms: u64,
    /// Max concurrent campaign jobs this worker process will run
    pub max_concurrent_campaigns: usize,
    /// Segment evaluator cursor page size
    pub cursor_page_size: usize,
    pub provider_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_concurrent_campaigns: 4,
            cursor_page_size: 200,
            provider_timeout_ms: 10_000,
        }
    }
}

/// Reconciler sweep configuration (§4.8)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub sweep_interval_ms: u64,
    pub orphan_lookback_minutes: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 15_000,
            orphan_lookback_minutes: 60,
        }
    }
}

/// Per-campaign advisory lock configuration (§5)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub lock_ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 30,
            heartbeat_interval_seconds: 10,
        }
    }
}

/// Webhook ingestion configuration (§4.7, §6)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// HMAC secret validating inbound provider signatures, if the provider signs callbacks
    pub signing_secret: String,
    pub require_signature: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            require_signature: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Messaging engine configuration
# Environment variables override these settings

[http]
port = 8080
host = "0.0.0.0"

[database]
url = "sqlite://./data/engine.db"
max_connections = 10

[redis]
url = "redis://localhost:6379"

[provider]
base_url = "http://localhost:9999"
account_sid = ""
auth_token = ""
timeout_ms = 10000
signing_secret = ""

[rate_limiter]
key_ttl_seconds = 2

[scheduler]
enabled = true
poll_interval_ms = 30000
batch_size = 50
stale_threshold_minutes = 15

[orchestrator]
poll_interval_ms = 500
max_concurrent_campaigns = 4
cursor_page_size = 200
provider_timeout_ms = 10000

[reconciler]
sweep_interval_ms = 15000
orphan_lookback_minutes = 60

[lock]
lock_ttl_seconds = 30
heartbeat_interval_seconds = 10

[webhook]
signing_secret = ""
require_signature = false

data_dir = "./data"
dev_mode = false
"#
        .to_string()
    }
}
