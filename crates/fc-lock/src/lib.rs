//! Per-key distributed advisory locking over Redis.
//!
//! Used by the Orchestrator to enforce "at most one worker per campaign"
//! (§5) and by the Scheduler/Reconciler sweeps to avoid redundant
//! concurrent sweeps across multiple processes.
//!
//! # Example
//!
//! ```no_run
//! use fc_lock::{AdvisoryLockConfig, AdvisoryLockManager};
//!
//! async fn example() {
//!     let manager = AdvisoryLockManager::new(AdvisoryLockConfig::new("redis://localhost:6379".to_string()))
//!         .await
//!         .unwrap();
//!
//!     if let Some(lock) = manager.try_acquire("campaign:42").await.unwrap() {
//!         // process campaign 42 exclusively
//!         lock.release().await;
//!     }
//! }
//! ```

mod error;
mod lock;

pub use error::{LockError, Result};
pub use lock::{AdvisoryLockConfig, AdvisoryLockManager, LockHandle};
