//! Distributed per-campaign, per-second rate limiting (§5).
//!
//! One Redis key per `(campaign_id, unix_second)`, incremented atomically
//! and expired after a couple of seconds so a clock hiccup can't leave a
//! stale counter around. Ported from this system's original per-second
//! counter algorithm (WATCH/INCR/EXPIRE under a transaction, retried once on
//! a concurrent-write conflict, and failed open on any Redis error so an
//! outage degrades throughput instead of blocking every send).

pub mod error;

use redis::aio::ConnectionManager;
use redis::RedisError;
use tracing::{error, warn};

pub use error::{RateLimiterError, Result};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub redis_url: String,
    /// How long a per-second counter key lives before Redis reclaims it.
    /// Kept above 1s so a slightly-late request in the same window still
    /// finds its counter.
    pub key_ttl_seconds: u64,
}

impl RateLimiterConfig {
    pub fn new(redis_url: String) -> Self {
        Self {
            redis_url,
            ..Default::default()
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_ttl_seconds: 2,
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub current_count: i64,
    pub remaining_capacity: i64,
}

const CHECK_AND_INCREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call("GET", KEYS[1]) or "0")
local limit = tonumber(ARGV[1])
if current >= limit then
    return {0, current}
end
local new = redis.call("INCR", KEYS[1])
redis.call("EXPIRE", KEYS[1], ARGV[2])
return {1, new}
"#;

#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub async fn new(config: RateLimiterConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.clone())
            .map_err(|e| RateLimiterError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RateLimiterError::Connection(e.to_string()))?;
        Ok(Self { conn, config })
    }

    fn key_for(&self, campaign_id: &str) -> String {
        let current_second = chrono::Utc::now().timestamp();
        format!("campaign:{campaign_id}:rate_limit:{current_second}")
    }

    /// Atomically check the current window's count against `rate_limit` and
    /// increment if admitted. Fails open (admits, with `current_count: 0`)
    /// on any Redis error — a degraded limiter must never be the reason a
    /// compliant campaign stalls.
    pub async fn check_and_increment(&self, campaign_id: &str, rate_limit: u32) -> Decision {
        let key = self.key_for(campaign_id);
        let mut conn = self.conn.clone();

        let result: std::result::Result<(i64, i64), RedisError> =
            redis::Script::new(CHECK_AND_INCREMENT_SCRIPT)
                .key(&key)
                .arg(rate_limit)
                .arg(self.config.key_ttl_seconds)
                .invoke_async(&mut conn)
                .await;

        match result {
            Ok((1, new_count)) => Decision {
                allowed: true,
                current_count: new_count,
                remaining_capacity: (rate_limit as i64 - new_count).max(0),
            },
            Ok((_, current_count)) => Decision {
                allowed: false,
                current_count,
                remaining_capacity: 0,
            },
            Err(e) => {
                warn!(campaign_id, error = %e, "rate limiter degraded, admitting by default");
                metrics::counter!("rate_limiter.degraded_admits_total").increment(1);
                Decision {
                    allowed: true,
                    current_count: 0,
                    remaining_capacity: rate_limit as i64,
                }
            }
        }
    }

    /// Current count for the active window, for monitoring. Returns 0 on
    /// any Redis error rather than propagating — this is a status read, not
    /// an admission decision.
    pub async fn current_rate(&self, campaign_id: &str) -> i64 {
        let key = self.key_for(campaign_id);
        let mut conn = self.conn.clone();
        match redis::cmd("GET")
            .arg(&key)
            .query_async::<Option<i64>>(&mut conn)
            .await
        {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                error!(campaign_id, error = %e, "failed to read current rate limiter count");
                0
            }
        }
    }

    /// Admin/testing helper: clear the active window's counter.
    pub async fn reset(&self, campaign_id: &str) -> Result<()> {
        let key = self.key_for(campaign_id);
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RateLimiterError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_two_second_ttl() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.key_ttl_seconds, 2);
    }

    #[test]
    fn config_new_keeps_ttl_default() {
        let config = RateLimiterConfig::new("redis://localhost:6380".to_string());
        assert_eq!(config.key_ttl_seconds, 2);
        assert_eq!(config.redis_url, "redis://localhost:6380");
    }
}
