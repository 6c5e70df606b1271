//! Order persistence
//!
//! Orders are created from completed checkout sessions and keyed by the
//! session id. No existence pre-check happens before the insert: redelivered
//! webhooks hit the unique constraint and surface as a conflict, which the
//! pipeline treats as "already recorded" rather than a failure.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub stripe_session_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub package_type: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub fulfillment_status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Parameters for creating an order from a checkout session.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub stripe_session_id: &'a str,
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub package_type: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub status: &'a str,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
}

impl OrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order. A duplicate session id returns
    /// `BillingError::Conflict` via the unique constraint.
    pub async fn create(&self, order: NewOrder<'_>) -> BillingResult<OrderRecord> {
        let record: OrderRecord = sqlx::query_as(
            r#"
            INSERT INTO orders (stripe_session_id, customer_name, customer_email,
                                package_type, amount_cents, currency, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, stripe_session_id, customer_name, customer_email, package_type,
                      amount_cents, currency, status, fulfillment_status, created_at, updated_at
            "#,
        )
        .bind(order.stripe_session_id)
        .bind(order.customer_name)
        .bind(order.customer_email)
        .bind(order.package_type)
        .bind(order.amount_cents)
        .bind(order.currency)
        .bind(order.status)
        .bind(order.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Update order status (paid/failed) by checkout session id. Returns the
    /// updated order, or NotFound when no order exists for the session.
    pub async fn set_status_by_session(
        &self,
        stripe_session_id: &str,
        status: &str,
    ) -> BillingResult<OrderRecord> {
        let record: Option<OrderRecord> = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $2, updated_at = NOW()
            WHERE stripe_session_id = $1
            RETURNING id, stripe_session_id, customer_name, customer_email, package_type,
                      amount_cents, currency, status, fulfillment_status, created_at, updated_at
            "#,
        )
        .bind(stripe_session_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| {
            BillingError::NotFound(format!("order for session {}", stripe_session_id))
        })
    }

    /// Advance fulfillment state once downstream delivery has been kicked off
    /// or completed.
    pub async fn set_fulfillment_status(
        &self,
        order_id: Uuid,
        fulfillment_status: &str,
    ) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET fulfillment_status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(fulfillment_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("order {}", order_id)));
        }

        Ok(())
    }

    pub async fn find_by_session(&self, stripe_session_id: &str) -> BillingResult<OrderRecord> {
        let record: Option<OrderRecord> = sqlx::query_as(
            r#"
            SELECT id, stripe_session_id, customer_name, customer_email, package_type,
                   amount_cents, currency, status, fulfillment_status, created_at, updated_at
            FROM orders
            WHERE stripe_session_id = $1
            "#,
        )
        .bind(stripe_session_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| {
            BillingError::NotFound(format!("order for session {}", stripe_session_id))
        })
    }
}
