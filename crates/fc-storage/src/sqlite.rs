//! SQLite implementation of [`StorageGateway`]. Timestamps are stored as
//! Unix millis, matching the convention the rest of this system already
//! uses for its local durable tables.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::{CampaignStatus, Channel, ConsentState, MessageStatus};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::{
    Campaign, CampaignReport, ConsentCaller, DeliveryReceipt, DispatchOutcome, InboundEvent,
    Message, NewDeliveryReceipt, NewInboundEvent, RecipientPage, Segment, Subscription, Template,
    User,
};
use crate::error::{Result, StorageError};
use crate::gateway::StorageGateway;

pub struct SqliteStorageGateway {
    pool: SqlitePool,
}

impl SqliteStorageGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn channel_to_str(channel: Channel) -> &'static str {
    match channel {
        Channel::Whatsapp => "whatsapp",
        Channel::Sms => "sms",
        Channel::Messenger => "messenger",
        Channel::Voice => "voice",
    }
}

fn channel_from_str(s: &str) -> Option<Channel> {
    match s {
        "whatsapp" => Some(Channel::Whatsapp),
        "sms" => Some(Channel::Sms),
        "messenger" => Some(Channel::Messenger),
        "voice" => Some(Channel::Voice),
        _ => None,
    }
}

fn millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Database(format!("invalid timestamp: {ms}")))
}

fn parse_user_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let attributes_json: String = row.get("attributes");
    let attributes: HashMap<String, String> = serde_json::from_str(&attributes_json)?;
    let consent_raw: String = row.get("consent_state");
    let consent_state = ConsentState::parse(&consent_raw)
        .ok_or_else(|| StorageError::Database(format!("bad consent_state: {consent_raw}")))?;

    Ok(User {
        phone: row.get("phone"),
        attributes,
        consent_state,
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

fn parse_campaign_row(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign> {
    let status_raw: String = row.get("status");
    let status = CampaignStatus::parse(&status_raw)
        .ok_or_else(|| StorageError::Database(format!("bad campaign status: {status_raw}")))?;
    let schedule_time_ms: Option<i64> = row.try_get("schedule_time").ok();

    Ok(Campaign {
        id: row.get("id"),
        topic: row.get("topic"),
        template_name: row.get("template_name"),
        segment_name: row.try_get("segment_name").ok(),
        status,
        rate_limit_per_second: row.get::<i64, _>("rate_limit_per_second") as u32,
        quiet_hours_start: row.try_get("quiet_hours_start").ok(),
        quiet_hours_end: row.try_get("quiet_hours_end").ok(),
        schedule_time: schedule_time_ms.map(from_millis).transpose()?,
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

fn parse_message_row(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let status_raw: String = row.get("status");
    let status = MessageStatus::parse(&status_raw)
        .ok_or_else(|| StorageError::Database(format!("bad message status: {status_raw}")))?;
    let channel_raw: String = row.get("channel");
    let channel = channel_from_str(&channel_raw)
        .ok_or_else(|| StorageError::Database(format!("bad channel: {channel_raw}")))?;
    let sent_at_ms: Option<i64> = row.try_get("sent_at").ok();
    let delivered_at_ms: Option<i64> = row.try_get("delivered_at").ok();

    Ok(Message {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        phone: row.get("phone"),
        template_name: row.get("template_name"),
        content: row.get("content"),
        channel,
        status,
        provider_sid: row.try_get("provider_sid").ok(),
        error_code: row.try_get("error_code").ok(),
        error_message: row.try_get("error_message").ok(),
        created_at: from_millis(row.get("created_at"))?,
        sent_at: sent_at_ms.map(from_millis).transpose()?,
        delivered_at: delivered_at_ms.map(from_millis).transpose()?,
    })
}

fn parse_receipt_row(row: &sqlx::sqlite::SqliteRow) -> Result<DeliveryReceipt> {
    Ok(DeliveryReceipt {
        id: row.get("id"),
        raw_payload: row.get("raw_payload"),
        provider_message_id: row.get("provider_message_id"),
        status: row.get("status"),
        error_code: row.try_get("error_code").ok(),
        message_id: row.try_get("message_id").ok(),
        reconciled: row.get::<i64, _>("reconciled") != 0,
        created_at: from_millis(row.get("created_at"))?,
    })
}

#[async_trait]
impl StorageGateway for SqliteStorageGateway {
    async fn upsert_user(
        &self,
        phone: &str,
        attributes: HashMap<String, String>,
        caller: ConsentCaller,
    ) -> Result<User> {
        let now = Utc::now();
        let existing = self.get_user(phone).await?;

        let (merged_attrs, consent_state) = match existing {
            Some(current) => {
                let mut merged = current.attributes.clone();
                merged.extend(attributes);
                let state = if current.consent_state == ConsentState::Stop
                    && caller != ConsentCaller::ConsentEngine
                {
                    ConsentState::Stop
                } else {
                    current.consent_state
                };
                (merged, state)
            }
            None => (attributes, ConsentState::OptIn),
        };

        let attrs_json = serde_json::to_string(&merged_attrs)?;
        sqlx::query(
            "INSERT INTO users (phone, attributes, consent_state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET attributes = excluded.attributes,
                 consent_state = excluded.consent_state, updated_at = excluded.updated_at",
        )
        .bind(phone)
        .bind(&attrs_json)
        .bind(consent_state.as_str())
        .bind(millis(now))
        .bind(millis(now))
        .execute(&self.pool)
        .await?;

        self.get_user(phone)
            .await?
            .ok_or_else(|| StorageError::Database("user vanished after upsert".to_string()))
    }

    async fn get_user(&self, phone: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE phone = ?")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_user_row).transpose()
    }

    async fn set_consent_state(&self, phone: &str, state: ConsentState) -> Result<()> {
        let now = millis(Utc::now());
        sqlx::query("UPDATE users SET consent_state = ?, updated_at = ? WHERE phone = ?")
            .bind(state.as_str())
            .bind(now)
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_template(&self, name: &str) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT * FROM templates WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let channel_raw: String = row.get("channel");
                let channel = channel_from_str(&channel_raw)
                    .ok_or_else(|| StorageError::Database(format!("bad channel: {channel_raw}")))?;
                Ok(Some(Template {
                    name: row.get("name"),
                    channel,
                    locale: row.get("locale"),
                    content: row.get("content"),
                }))
            }
        }
    }

    async fn get_segment(&self, name: &str) -> Result<Option<Segment>> {
        let row = sqlx::query("SELECT * FROM segments WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let predicate_json: String = row.get("predicate");
                let predicate = serde_json::from_str(&predicate_json)?;
                Ok(Some(Segment {
                    name: row.get("name"),
                    predicate,
                }))
            }
        }
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_campaign_row).transpose()
    }

    async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign> {
        let now = millis(Utc::now());
        sqlx::query(
            "INSERT INTO campaigns (id, topic, template_name, segment_name, status,
                 rate_limit_per_second, quiet_hours_start, quiet_hours_end, schedule_time,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&campaign.id)
        .bind(&campaign.topic)
        .bind(&campaign.template_name)
        .bind(&campaign.segment_name)
        .bind(campaign.status.as_str())
        .bind(campaign.rate_limit_per_second as i64)
        .bind(&campaign.quiet_hours_start)
        .bind(&campaign.quiet_hours_end)
        .bind(campaign.schedule_time.map(millis))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_campaign(&campaign.id)
            .await?
            .ok_or_else(|| StorageError::Database("campaign vanished after insert".to_string()))
    }

    async fn transition_campaign_status(
        &self,
        id: &str,
        expected_current: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool> {
        if !expected_current.can_transition_to(next) {
            return Err(StorageError::Conflict(format!(
                "illegal campaign transition {expected_current:?} -> {next:?}"
            )));
        }
        let now = millis(Utc::now());
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(now)
        .bind(id)
        .bind(expected_current.as_str())
        .execute(&self.pool)
        .await?;

        let advanced = result.rows_affected() > 0;
        if !advanced {
            debug!(campaign_id = %id, ?expected_current, ?next, "campaign transition lost the race");
        }
        Ok(advanced)
    }

    async fn due_ready_campaigns(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT * FROM campaigns WHERE status = ?
             AND (schedule_time IS NULL OR schedule_time <= ?)
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(CampaignStatus::Ready.as_str())
        .bind(millis(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_campaign_row).collect()
    }

    async fn stale_running_campaigns(
        &self,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT * FROM campaigns WHERE status = ? AND updated_at < ?
             ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(CampaignStatus::Running.as_str())
        .bind(millis(stale_before))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_campaign_row).collect()
    }

    async fn fetch_recipients_page(
        &self,
        segment: Option<&Segment>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<RecipientPage> {
        let compiled = fc_segment::compile(segment.map(|s| &s.predicate))?;
        let mut query = format!("SELECT * FROM users WHERE ({})", compiled.clause);
        if cursor.is_some() {
            query.push_str(" AND phone > ?");
        }
        query.push_str(" ORDER BY phone ASC LIMIT ?");

        let mut q = sqlx::query(&query);
        for param in &compiled.params {
            q = q.bind(param);
        }
        if let Some(cursor) = cursor {
            q = q.bind(cursor);
        }
        // Fetch one extra row to know if another page follows.
        q = q.bind(page_size as i64 + 1);

        let mut rows = q.fetch_all(&self.pool).await?;
        let has_more = rows.len() as u32 > page_size;
        if has_more {
            rows.truncate(page_size as usize);
        }

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            users.push(parse_user_row(row)?);
        }
        let next_cursor = if has_more {
            users.last().map(|u| u.phone.clone())
        } else {
            None
        };

        Ok(RecipientPage { users, next_cursor })
    }

    async fn create_message_if_absent(&self, message: Message) -> Result<Option<Message>> {
        let now = millis(Utc::now());
        let result = sqlx::query(
            "INSERT INTO messages (id, campaign_id, phone, template_name, content, channel,
                 status, provider_sid, error_code, error_message, created_at, sent_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(campaign_id, phone) DO NOTHING",
        )
        .bind(&message.id)
        .bind(&message.campaign_id)
        .bind(&message.phone)
        .bind(&message.template_name)
        .bind(&message.content)
        .bind(channel_to_str(message.channel))
        .bind(message.status.as_str())
        .bind(&message.provider_sid)
        .bind(&message.error_code)
        .bind(&message.error_message)
        .bind(now)
        .bind(message.sent_at.map(millis))
        .bind(message.delivered_at.map(millis))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(campaign_id = %message.campaign_id, phone = %message.phone, "duplicate message skipped");
            return Ok(None);
        }
        Ok(Some(message))
    }

    async fn update_message_dispatch_result(
        &self,
        message_id: &str,
        outcome: DispatchOutcome,
    ) -> Result<()> {
        let now = millis(Utc::now());
        match outcome {
            DispatchOutcome::Sent { provider_sid } => {
                sqlx::query(
                    "UPDATE messages SET status = ?, provider_sid = ?, sent_at = ? WHERE id = ?",
                )
                .bind(MessageStatus::Sent.as_str())
                .bind(provider_sid)
                .bind(now)
                .bind(message_id)
                .execute(&self.pool)
                .await?;
            }
            DispatchOutcome::Failed {
                error_code,
                error_message,
            } => {
                sqlx::query(
                    "UPDATE messages SET status = ?, error_code = ?, error_message = ? WHERE id = ?",
                )
                .bind(MessageStatus::Failed.as_str())
                .bind(error_code)
                .bind(error_message)
                .bind(message_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn advance_message_state(
        &self,
        message_id: &str,
        next: MessageStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let row = sqlx::query("SELECT status FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(StorageError::NotFound(format!("message {message_id}")));
        };
        let current_raw: String = row.get("status");
        let current = MessageStatus::parse(&current_raw)
            .ok_or_else(|| StorageError::Database(format!("bad message status: {current_raw}")))?;

        if !current.can_advance_to(next) {
            warn!(message_id, ?current, ?next, "rejected out-of-order message transition");
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE messages SET status = ?, delivered_at = COALESCE(?, delivered_at)
             WHERE id = ? AND status = ?",
        )
        .bind(next.as_str())
        .bind(delivered_at.map(millis))
        .bind(message_id)
        .bind(current_raw)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_message_by_provider_sid(&self, provider_sid: &str) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE provider_sid = ?")
            .bind(provider_sid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_message_row).transpose()
    }

    async fn campaign_report(&self, campaign_id: &str) -> Result<CampaignReport> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) as cnt FROM messages WHERE campaign_id = ? GROUP BY status",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let mut status_counts = HashMap::new();
        for row in &rows {
            let status: String = row.get("status");
            let count: i64 = row.get("cnt");
            status_counts.insert(status, count);
        }

        let error_rows = sqlx::query(
            "SELECT error_code, COUNT(*) as cnt FROM messages
             WHERE campaign_id = ? AND error_code IS NOT NULL
             GROUP BY error_code ORDER BY cnt DESC LIMIT 5",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        let top_error_codes = error_rows
            .iter()
            .map(|row| (row.get::<String, _>("error_code"), row.get::<i64, _>("cnt")))
            .collect();

        Ok(CampaignReport {
            campaign_id: campaign_id.to_string(),
            status_counts,
            top_error_codes,
        })
    }

    async fn insert_inbound_event(&self, event: NewInboundEvent) -> Result<InboundEvent> {
        let id = Uuid::new_v4().to_string();
        let now = millis(Utc::now());
        sqlx::query(
            "INSERT INTO inbound_events (id, raw_payload, channel, phone, body,
                 provider_message_id, user_phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&event.raw_payload)
        .bind(event.channel.map(channel_to_str))
        .bind(&event.phone)
        .bind(&event.body)
        .bind(&event.provider_message_id)
        .bind(&event.user_phone)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(InboundEvent {
            id,
            raw_payload: event.raw_payload,
            channel: event.channel,
            phone: event.phone,
            body: event.body,
            provider_message_id: event.provider_message_id,
            user_phone: event.user_phone,
            created_at: from_millis(now)?,
        })
    }

    async fn insert_delivery_receipt(&self, receipt: NewDeliveryReceipt) -> Result<DeliveryReceipt> {
        let id = Uuid::new_v4().to_string();
        let now = millis(Utc::now());

        let message_id: Option<String> =
            sqlx::query("SELECT id FROM messages WHERE provider_sid = ?")
                .bind(&receipt.provider_message_id)
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("id"));
        let reconciled = message_id.is_some();

        sqlx::query(
            "INSERT INTO delivery_receipts (id, raw_payload, provider_message_id, status,
                 error_code, message_id, reconciled, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&receipt.raw_payload)
        .bind(&receipt.provider_message_id)
        .bind(&receipt.status)
        .bind(&receipt.error_code)
        .bind(&message_id)
        .bind(reconciled as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(DeliveryReceipt {
            id,
            raw_payload: receipt.raw_payload,
            provider_message_id: receipt.provider_message_id,
            status: receipt.status,
            error_code: receipt.error_code,
            message_id,
            reconciled,
            created_at: from_millis(now)?,
        })
    }

    async fn unreconciled_receipts(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DeliveryReceipt>> {
        let rows = sqlx::query(
            "SELECT * FROM delivery_receipts WHERE reconciled = 0 AND created_at >= ?
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(millis(since))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_receipt_row).collect()
    }

    async fn mark_receipt_reconciled(&self, receipt_id: &str, message_id: &str) -> Result<()> {
        sqlx::query("UPDATE delivery_receipts SET reconciled = 1, message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(receipt_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_subscription(&self, phone: &str, topic: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE user_phone = ? AND topic = ?")
            .bind(phone)
            .bind(topic)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Subscription {
            user_phone: row.get("user_phone"),
            topic: row.get("topic"),
            opted_in: row.get::<i64, _>("opted_in") != 0,
        }))
    }

    async fn set_subscription(&self, phone: &str, topic: &str, opted_in: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (user_phone, topic, opted_in) VALUES (?, ?, ?)
             ON CONFLICT(user_phone, topic) DO UPDATE SET opted_in = excluded.opted_in",
        )
        .bind(phone)
        .bind(topic)
        .bind(opted_in as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                phone TEXT PRIMARY KEY,
                attributes TEXT NOT NULL DEFAULT '{}',
                consent_state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                name TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                locale TEXT NOT NULL,
                content TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS segments (
                name TEXT PRIMARY KEY,
                predicate TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                template_name TEXT NOT NULL,
                segment_name TEXT,
                status TEXT NOT NULL,
                rate_limit_per_second INTEGER NOT NULL,
                quiet_hours_start TEXT,
                quiet_hours_end TEXT,
                schedule_time INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                template_name TEXT NOT NULL,
                content TEXT NOT NULL,
                channel TEXT NOT NULL,
                status TEXT NOT NULL,
                provider_sid TEXT,
                error_code TEXT,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                sent_at INTEGER,
                delivered_at INTEGER,
                UNIQUE(campaign_id, phone)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_campaign ON messages(campaign_id);
            CREATE INDEX IF NOT EXISTS idx_messages_provider_sid ON messages(provider_sid);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inbound_events (
                id TEXT PRIMARY KEY,
                raw_payload TEXT NOT NULL,
                channel TEXT,
                phone TEXT,
                body TEXT,
                provider_message_id TEXT,
                user_phone TEXT,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_receipts (
                id TEXT PRIMARY KEY,
                raw_payload TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                status TEXT NOT NULL,
                error_code TEXT,
                message_id TEXT,
                reconciled INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_receipts_reconciled ON delivery_receipts(reconciled);
            CREATE INDEX IF NOT EXISTS idx_receipts_provider_sid ON delivery_receipts(provider_message_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_phone TEXT NOT NULL,
                topic TEXT NOT NULL,
                opted_in INTEGER NOT NULL,
                PRIMARY KEY (user_phone, topic)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("initialized sqlite storage schema");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::{Logic, Operator, SegmentPredicate};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_gateway() -> SqliteStorageGateway {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let gw = SqliteStorageGateway::new(pool);
        gw.init_schema().await.unwrap();
        gw
    }

    #[tokio::test]
    async fn upsert_user_merges_attributes() {
        let gw = test_gateway().await;
        let mut attrs = HashMap::new();
        attrs.insert("city".to_string(), "NYC".to_string());
        gw.upsert_user("+14155550001", attrs, ConsentCaller::Other)
            .await
            .unwrap();

        let mut more = HashMap::new();
        more.insert("plan".to_string(), "pro".to_string());
        let user = gw
            .upsert_user("+14155550001", more, ConsentCaller::Other)
            .await
            .unwrap();

        assert_eq!(user.attributes.get("city").unwrap(), "NYC");
        assert_eq!(user.attributes.get("plan").unwrap(), "pro");
    }

    #[tokio::test]
    async fn stop_consent_is_sticky_against_non_consent_engine_callers() {
        let gw = test_gateway().await;
        gw.upsert_user("+14155550001", HashMap::new(), ConsentCaller::Other)
            .await
            .unwrap();
        gw.set_consent_state("+14155550001", ConsentState::Stop)
            .await
            .unwrap();

        let user = gw
            .upsert_user("+14155550001", HashMap::new(), ConsentCaller::Other)
            .await
            .unwrap();
        assert_eq!(user.consent_state, ConsentState::Stop);
    }

    #[tokio::test]
    async fn create_message_if_absent_rejects_duplicate_recipient() {
        let gw = test_gateway().await;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            campaign_id: "camp-1".to_string(),
            phone: "+14155550001".to_string(),
            template_name: "welcome".to_string(),
            content: "hi".to_string(),
            channel: Channel::Sms,
            status: MessageStatus::Queued,
            provider_sid: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            sent_at: None,
            delivered_at: None,
        };
        let first = gw.create_message_if_absent(message.clone()).await.unwrap();
        assert!(first.is_some());
        let second = gw.create_message_if_absent(message).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn advance_message_state_rejects_regression() {
        let gw = test_gateway().await;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            campaign_id: "camp-1".to_string(),
            phone: "+14155550001".to_string(),
            template_name: "welcome".to_string(),
            content: "hi".to_string(),
            channel: Channel::Sms,
            status: MessageStatus::Queued,
            provider_sid: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            sent_at: None,
            delivered_at: None,
        };
        gw.create_message_if_absent(message.clone()).await.unwrap();
        assert!(gw
            .advance_message_state(&message.id, MessageStatus::Delivered, None)
            .await
            .unwrap());
        assert!(!gw
            .advance_message_state(&message.id, MessageStatus::Sent, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn transition_campaign_status_loses_the_race_gracefully() {
        let gw = test_gateway().await;
        let campaign = Campaign {
            id: "camp-1".to_string(),
            topic: "promo".to_string(),
            template_name: "welcome".to_string(),
            segment_name: None,
            status: CampaignStatus::Ready,
            rate_limit_per_second: 10,
            quiet_hours_start: None,
            quiet_hours_end: None,
            schedule_time: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        gw.create_campaign(campaign).await.unwrap();

        let won = gw
            .transition_campaign_status("camp-1", CampaignStatus::Ready, CampaignStatus::Running)
            .await
            .unwrap();
        assert!(won);

        let lost = gw
            .transition_campaign_status("camp-1", CampaignStatus::Ready, CampaignStatus::Running)
            .await
            .unwrap();
        assert!(!lost);
    }

    #[tokio::test]
    async fn fetch_recipients_page_paginates_by_phone_cursor() {
        let gw = test_gateway().await;
        for n in 0..5 {
            gw.upsert_user(&format!("+1415555000{n}"), HashMap::new(), ConsentCaller::Other)
                .await
                .unwrap();
        }

        let segment = Segment {
            name: "all".to_string(),
            predicate: SegmentPredicate::Leaf {
                attribute: "consent_state".to_string(),
                operator: Operator::Equals,
                value: "OPT_IN".to_string(),
            },
        };

        let page1 = gw
            .fetch_recipients_page(Some(&segment), None, 2)
            .await
            .unwrap();
        assert_eq!(page1.users.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = gw
            .fetch_recipients_page(Some(&segment), page1.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(page2.users.len(), 2);
    }

    #[tokio::test]
    async fn insert_delivery_receipt_reconciles_against_known_provider_sid() {
        let gw = test_gateway().await;
        let message = Message {
            id: Uuid::new_v4().to_string(),
            campaign_id: "camp-1".to_string(),
            phone: "+14155550001".to_string(),
            template_name: "welcome".to_string(),
            content: "hi".to_string(),
            channel: Channel::Sms,
            status: MessageStatus::Sent,
            provider_sid: Some("SID123".to_string()),
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            sent_at: Some(Utc::now()),
            delivered_at: None,
        };
        gw.create_message_if_absent(message).await.unwrap();

        let receipt = gw
            .insert_delivery_receipt(NewDeliveryReceipt {
                raw_payload: "{}".to_string(),
                provider_message_id: "SID123".to_string(),
                status: "delivered".to_string(),
                error_code: None,
            })
            .await
            .unwrap();

        assert!(receipt.reconciled);
        assert!(receipt.message_id.is_some());
    }
}
