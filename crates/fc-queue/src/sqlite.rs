//! SQLite-backed job queue providing SQS-like visibility-timeout semantics
//! without an external broker — the reference deployment target for this
//! engine (§5: "durably-persisted local job queue").

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::{CampaignJob, EmbeddedQueue, QueueConsumer, QueueError, QueueMetrics, QueuePublisher, QueuedJob, Result};

pub struct SqliteQueue {
    pool: Pool<Sqlite>,
    queue_name: String,
    visibility_timeout_seconds: u32,
    running: AtomicBool,
}

impl SqliteQueue {
    pub fn new(pool: Pool<Sqlite>, queue_name: String, visibility_timeout_seconds: u32) -> Self {
        Self {
            pool,
            queue_name,
            visibility_timeout_seconds,
            running: AtomicBool::new(true),
        }
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_jobs (
                id TEXT PRIMARY KEY,
                queue_name TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                receipt_handle TEXT,
                visible_at INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                receive_count INTEGER NOT NULL DEFAULT 0,
                UNIQUE(queue_name, dedup_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_jobs_visible ON queue_jobs (queue_name, visible_at)",
        )
        .execute(&self.pool)
        .await?;

        info!(queue = %self.queue_name, "sqlite job queue schema initialized");
        Ok(())
    }

    fn generate_receipt_handle(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl QueueConsumer for SqliteQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }

        let now = Utc::now().timestamp();
        let new_visible_at = now + self.visibility_timeout_seconds as i64;

        let rows = sqlx::query(
            "SELECT id, payload FROM queue_jobs WHERE queue_name = ? AND visible_at <= ? ORDER BY created_at LIMIT ?",
        )
        .bind(&self.queue_name)
        .bind(now)
        .bind(max_jobs as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());

        for row in rows {
            let id: String = row.get("id");
            let payload: String = row.get("payload");
            let receipt_handle = self.generate_receipt_handle();

            let updated = sqlx::query(
                r#"
                UPDATE queue_jobs
                SET receipt_handle = ?, visible_at = ?, receive_count = receive_count + 1
                WHERE id = ? AND queue_name = ? AND visible_at <= ?
                "#,
            )
            .bind(&receipt_handle)
            .bind(new_visible_at)
            .bind(&id)
            .bind(&self.queue_name)
            .bind(now)
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 0 {
                continue;
            }

            let job: CampaignJob = serde_json::from_str(&payload)?;
            jobs.push(QueuedJob { job, receipt_handle });
        }

        if !jobs.is_empty() {
            debug!(queue = %self.queue_name, count = jobs.len(), "polled jobs from sqlite queue");
        }

        Ok(jobs)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM queue_jobs WHERE receipt_handle = ? AND queue_name = ?")
            .bind(receipt_handle)
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(receipt_handle = %receipt_handle, queue = %self.queue_name, "ack failed: job not found");
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        debug!(receipt_handle = %receipt_handle, queue = %self.queue_name, "job acknowledged");
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()> {
        let delay = delay_seconds.unwrap_or(0) as i64;
        let new_visible_at = Utc::now().timestamp() + delay;

        let result = sqlx::query(
            "UPDATE queue_jobs SET visible_at = ?, receipt_handle = NULL WHERE receipt_handle = ? AND queue_name = ?",
        )
        .bind(new_visible_at)
        .bind(receipt_handle)
        .bind(&self.queue_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(receipt_handle = %receipt_handle, queue = %self.queue_name, "nack failed: job not found");
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        Ok(())
    }

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()> {
        let new_visible_at = Utc::now().timestamp() + seconds as i64;

        let result = sqlx::query("UPDATE queue_jobs SET visible_at = ? WHERE receipt_handle = ? AND queue_name = ?")
            .bind(new_visible_at)
            .bind(receipt_handle)
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!(queue = %self.queue_name, "sqlite job queue consumer stopped");
    }

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        let now = Utc::now().timestamp();

        let pending_row = sqlx::query(
            "SELECT COUNT(*) as count FROM queue_jobs WHERE queue_name = ? AND visible_at <= ? AND receipt_handle IS NULL",
        )
        .bind(&self.queue_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let pending_jobs: i64 = pending_row.get("count");

        let in_flight_row = sqlx::query(
            "SELECT COUNT(*) as count FROM queue_jobs WHERE queue_name = ? AND receipt_handle IS NOT NULL",
        )
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;
        let in_flight_jobs: i64 = in_flight_row.get("count");

        Ok(Some(QueueMetrics {
            pending_jobs: pending_jobs as u64,
            in_flight_jobs: in_flight_jobs as u64,
            queue_identifier: self.queue_name.clone(),
        }))
    }
}

#[async_trait]
impl QueuePublisher for SqliteQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn publish(&self, dedup_key: &str, job: CampaignJob) -> Result<String> {
        let now = Utc::now();
        let payload = serde_json::to_string(&job)?;
        let id = uuid::Uuid::new_v4().to_string();

        let existing = sqlx::query("SELECT id FROM queue_jobs WHERE queue_name = ? AND dedup_key = ?")
            .bind(&self.queue_name)
            .bind(dedup_key)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            let existing_id: String = row.get("id");
            debug!(dedup_key = %dedup_key, queue = %self.queue_name, "duplicate job publish, skipping");
            return Ok(existing_id);
        }

        sqlx::query(
            r#"
            INSERT INTO queue_jobs (id, queue_name, dedup_key, visible_at, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&self.queue_name)
        .bind(dedup_key)
        .bind(now.timestamp())
        .bind(&payload)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        debug!(job_id = %id, dedup_key = %dedup_key, queue = %self.queue_name, "job published to sqlite queue");

        Ok(id)
    }
}

#[async_trait]
impl EmbeddedQueue for SqliteQueue {
    async fn init_schema(&self) -> Result<()> {
        self.create_schema().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_queue() -> SqliteQueue {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let queue = SqliteQueue::new(pool, "test-queue".to_string(), 30);
        queue.init_schema().await.unwrap();
        queue
    }

    fn job(campaign_id: &str) -> CampaignJob {
        CampaignJob {
            campaign_id: campaign_id.to_string(),
            segment_id: None,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn publish_and_poll_roundtrip() {
        let queue = create_test_queue().await;

        queue.publish("campaign-1", job("campaign-1")).await.unwrap();

        let jobs = queue.poll(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.campaign_id, "campaign-1");

        queue.ack(&jobs[0].receipt_handle).await.unwrap();

        let jobs = queue.poll(10).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn nack_delays_visibility() {
        let queue = create_test_queue().await;
        queue.publish("campaign-2", job("campaign-2")).await.unwrap();

        let jobs = queue.poll(10).await.unwrap();
        queue.nack(&jobs[0].receipt_handle, Some(60)).await.unwrap();

        let jobs = queue.poll(10).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn republishing_same_dedup_key_is_a_no_op() {
        let queue = create_test_queue().await;

        let id1 = queue.publish("campaign-3", job("campaign-3")).await.unwrap();
        let id2 = queue.publish("campaign-3", job("campaign-3")).await.unwrap();
        assert_eq!(id1, id2);

        let jobs = queue.poll(10).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
