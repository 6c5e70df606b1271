//! Customer persistence
//!
//! Customers are upserted by email on every successful checkout and
//! accumulate aggregate counters. Subscription events adjust the tier via
//! the Stripe customer id; a deleted subscription clears the tier but never
//! deletes the row.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub stripe_customer_id: Option<String>,
    pub tier: Option<String>,
    pub total_spent_cents: i64,
    pub order_count: i32,
    pub last_order_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct CustomerService {
    pool: PgPool,
}

impl CustomerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a customer from a completed checkout: accumulate spend and
    /// order counters, keep the earliest non-empty name, and attach the
    /// Stripe customer id when first seen.
    pub async fn upsert_from_checkout(
        &self,
        email: &str,
        name: &str,
        stripe_customer_id: Option<&str>,
        amount_cents: i64,
    ) -> BillingResult<CustomerRecord> {
        let record: CustomerRecord = sqlx::query_as(
            r#"
            INSERT INTO customers (email, name, stripe_customer_id, total_spent_cents, order_count, last_order_at)
            VALUES ($1, $2, $3, $4, 1, NOW())
            ON CONFLICT (email) DO UPDATE SET
                name = CASE WHEN customers.name = '' THEN EXCLUDED.name ELSE customers.name END,
                stripe_customer_id = COALESCE(customers.stripe_customer_id, EXCLUDED.stripe_customer_id),
                total_spent_cents = customers.total_spent_cents + EXCLUDED.total_spent_cents,
                order_count = customers.order_count + 1,
                last_order_at = NOW(),
                updated_at = NOW()
            RETURNING id, email, name, stripe_customer_id, tier, total_spent_cents,
                      order_count, last_order_at, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(stripe_customer_id)
        .bind(amount_cents)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Set or clear the subscription tier for the customer owning the given
    /// Stripe customer id. Returns false when no matching customer exists.
    pub async fn set_tier_by_stripe_customer(
        &self,
        stripe_customer_id: &str,
        tier: Option<&str>,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET tier = $2, updated_at = NOW()
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(stripe_customer_id)
        .bind(tier)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_email(&self, email: &str) -> BillingResult<CustomerRecord> {
        let record: Option<CustomerRecord> = sqlx::query_as(
            r#"
            SELECT id, email, name, stripe_customer_id, tier, total_spent_cents,
                   order_count, last_order_at, created_at, updated_at
            FROM customers
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| BillingError::NotFound(format!("customer {}", email)))
    }

    /// Email on file for a Stripe customer, for courtesy notifications.
    pub async fn email_for_stripe_customer(
        &self,
        stripe_customer_id: &str,
    ) -> BillingResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT email FROM customers WHERE stripe_customer_id = $1")
                .bind(stripe_customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(email,)| email))
    }
}
