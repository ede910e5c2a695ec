//! Per-key distributed advisory lock over Redis.
//!
//! Generalized from a single fixed-key leader-election primitive into a
//! `try_acquire(key)` call so the Orchestrator can take "at most one worker
//! per campaign" (§5) without needing a separate lock type per use case.
//! The acquire/heartbeat/release mechanics (`SET NX EX`, a Lua
//! check-and-extend script, a Lua check-and-delete script) are unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{LockError, Result};

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("EXPIRE", KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("DEL", KEYS[1])
    return 1
else
    return 0
end
"#;

#[derive(Debug, Clone)]
pub struct AdvisoryLockConfig {
    pub redis_url: String,
    pub lock_ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub instance_id: String,
}

impl AdvisoryLockConfig {
    pub fn new(redis_url: String) -> Self {
        Self {
            redis_url,
            ..Default::default()
        }
    }
}

impl Default for AdvisoryLockConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            lock_ttl_seconds: 30,
            heartbeat_interval_seconds: 10,
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Connects to Redis once, hands out per-key lock attempts over that
/// shared connection.
#[derive(Clone)]
pub struct AdvisoryLockManager {
    conn: ConnectionManager,
    config: AdvisoryLockConfig,
}

impl AdvisoryLockManager {
    pub async fn new(config: AdvisoryLockConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.clone())
            .map_err(|e| LockError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        Ok(Self { conn, config })
    }

    /// Attempt to acquire the lock for `key`. Returns `None` if another
    /// owner currently holds it. A successful acquisition spawns a
    /// background heartbeat task that extends the lease until `release()`
    /// is called or the lease expires because the holder crashed.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockHandle>> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&self.config.instance_id)
            .arg("NX")
            .arg("EX")
            .arg(self.config.lock_ttl_seconds)
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            debug!(%key, "advisory lock held by another owner");
            return Ok(None);
        }

        info!(%key, instance_id = %self.config.instance_id, "acquired advisory lock");

        let (shutdown_tx, _) = broadcast::channel(1);
        let held = Arc::new(AtomicBool::new(true));

        let handle = LockHandle {
            key: key.to_string(),
            instance_id: self.config.instance_id.clone(),
            conn: self.conn.clone(),
            lock_ttl_seconds: self.config.lock_ttl_seconds,
            held: held.clone(),
            shutdown_tx: shutdown_tx.clone(),
        };

        let heartbeat_conn = self.conn.clone();
        let heartbeat_key = key.to_string();
        let instance_id = self.config.instance_id.clone();
        let ttl = self.config.lock_ttl_seconds;
        let interval = Duration::from_secs(self.config.heartbeat_interval_seconds.max(1));
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut conn = heartbeat_conn.clone();
                        let extended: std::result::Result<i32, redis::RedisError> = redis::Script::new(EXTEND_SCRIPT)
                            .key(&heartbeat_key)
                            .arg(&instance_id)
                            .arg(ttl)
                            .invoke_async(&mut conn)
                            .await;
                        match extended {
                            Ok(1) => debug!(key = %heartbeat_key, "extended advisory lock lease"),
                            Ok(_) => {
                                warn!(key = %heartbeat_key, "lost advisory lock lease");
                                held.store(false, Ordering::SeqCst);
                                break;
                            }
                            Err(e) => {
                                error!(key = %heartbeat_key, error = %e, "failed to extend advisory lock lease");
                                held.store(false, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(Some(handle))
    }
}

/// An acquired lock. Dropping it does not release the key (release is
/// explicit and async); callers must call `release()` when the protected
/// work completes.
pub struct LockHandle {
    key: String,
    instance_id: String,
    conn: ConnectionManager,
    lock_ttl_seconds: u64,
    held: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LockHandle {
    /// True as of the last heartbeat tick; a `false` here means the owner
    /// should stop touching the protected resource immediately — the lease
    /// may already belong to someone else.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    #[allow(dead_code)]
    fn ttl_seconds(&self) -> u64 {
        self.lock_ttl_seconds
    }

    /// Stop the heartbeat and release the key if we still own it.
    pub async fn release(&self) {
        let _ = self.shutdown_tx.send(());
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        let mut conn = self.conn.clone();
        match redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.instance_id)
            .invoke_async::<i32>(&mut conn)
            .await
        {
            Ok(1) => info!(key = %self.key, "released advisory lock"),
            Ok(_) => debug!(key = %self.key, "advisory lock already released or reassigned"),
            Err(e) => error!(key = %self.key, error = %e, "failed to release advisory lock"),
        }
        self.held.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AdvisoryLockConfig::default();
        assert_eq!(config.lock_ttl_seconds, 30);
        assert_eq!(config.heartbeat_interval_seconds, 10);
    }

    #[test]
    fn config_new_keeps_defaults_for_other_fields() {
        let config = AdvisoryLockConfig::new("redis://localhost:6380".to_string());
        assert_eq!(config.redis_url, "redis://localhost:6380");
        assert_eq!(config.lock_ttl_seconds, 30);
    }
}
