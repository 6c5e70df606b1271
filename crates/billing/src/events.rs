//! Webhook event log
//!
//! Every verified inbound event gets a row before any handler runs, and a
//! final update after. The log is an audit trail, not a processing queue:
//! redelivery detection queries it, but nothing polls it for work.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Persistence for `webhook_events` rows.
#[derive(Clone)]
pub struct EventLog {
    pool: PgPool,
}

impl EventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a verified event before processing begins (processed=false).
    ///
    /// Redelivery of the same event_id updates the existing row in place
    /// rather than inserting a duplicate, so the log keeps exactly one row
    /// per event_id.
    pub async fn record_received(
        &self,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, processed, payload)
            VALUES ($1, $2, FALSE, $3)
            ON CONFLICT (event_id) DO UPDATE SET
                processed = FALSE,
                error_message = NULL,
                payload = EXCLUDED.payload,
                processed_at = NULL
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write the final processing outcome for an event.
    pub async fn finalize(&self, event_id: &str, error_message: Option<&str>) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = $2,
                error_message = $3,
                processed_at = CASE WHEN $2 THEN NOW() ELSE NULL END
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error_message.is_none())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether this event_id has already been processed successfully.
    pub async fn already_processed(&self, event_id: &str) -> BillingResult<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT processed FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(processed,)| processed).unwrap_or(false))
    }

    /// List event-log rows, optionally filtered by processed state.
    pub async fn list(
        &self,
        processed_filter: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> BillingResult<Vec<WebhookEventRecord>> {
        let records: Vec<WebhookEventRecord> = match processed_filter {
            Some(processed) => {
                sqlx::query_as(
                    r#"
                    SELECT id, event_id, event_type, processed, error_message,
                           created_at, processed_at
                    FROM webhook_events
                    WHERE processed = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(processed)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, event_id, event_type, processed, error_message,
                           created_at, processed_at
                    FROM webhook_events
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(records)
    }

    /// Annotate events stuck unprocessed with no recorded error for longer
    /// than the given age. These are deliveries where the process died between
    /// the initial write and the final update; the provider should have
    /// redelivered them, so a lingering row needs operator attention.
    pub async fn annotate_stuck(&self, older_than_minutes: i64) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET error_message = CONCAT('Stuck unprocessed; flagged at ', NOW()::TEXT)
            WHERE processed = FALSE
              AND error_message IS NULL
              AND created_at < NOW() - ($1 || ' minutes')::INTERVAL
            "#,
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Fetch a single event-log row by provider event id.
    pub async fn get(&self, event_id: &str) -> BillingResult<WebhookEventRecord> {
        let record: Option<WebhookEventRecord> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, processed, error_message,
                   created_at, processed_at
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| BillingError::NotFound(format!("webhook event {}", event_id)))
    }
}

/// Stored webhook event record
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub processed: bool,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}
