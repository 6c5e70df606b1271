//! Internal analytics dashboard
//!
//! Aggregations straight off the database; no cache, every request recomputes.
//! Guarded by a static shared-secret header — this is an internal tool, not a
//! user-facing auth system.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use ridgeline_billing::WebhookEventRecord;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Compare the `x-admin-token` header against the configured secret.
/// Fails closed when no token is configured.
fn require_admin_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state
        .config
        .admin_api_token
        .as_deref()
        .ok_or(ApiError::NotConfigured("Admin access"))?;

    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    // Constant-time comparison to avoid leaking the token through timing
    if provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_revenue_cents: i64,
    pub revenue_30d_cents: i64,
    pub orders_by_status: HashMap<String, i64>,
    pub total_customers: i64,
    pub active_subscribers: i64,
    pub contact_by_status: HashMap<String, i64>,
    pub emails_sent_7d: i64,
    pub emails_failed_7d: i64,
    pub recent_orders: Vec<RecentOrder>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentOrder {
    pub id: Uuid,
    pub customer_email: String,
    pub package_type: String,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct StatusCountRow {
    status: String,
    count: i64,
}

/// GET /api/admin/analytics
pub async fn get_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AnalyticsResponse>> {
    require_admin_token(&state, &headers)?;

    let pool = &state.pool;

    // Independent aggregations are awaited together; none depends on another.
    let (
        total_revenue,
        revenue_30d,
        order_counts,
        total_customers,
        active_subscribers,
        contact_counts,
        email_counts,
        recent_orders,
    ) = tokio::try_join!(
        sqlx::query_as::<_, (i64,)>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM orders WHERE status = 'paid'",
        )
        .fetch_one(pool),
        sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM orders
            WHERE status = 'paid' AND created_at > NOW() - interval '30 days'
            "#,
        )
        .fetch_one(pool),
        sqlx::query_as::<_, StatusCountRow>(
            "SELECT status, COUNT(*) as count FROM orders GROUP BY status",
        )
        .fetch_all(pool),
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM customers").fetch_one(pool),
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM customers WHERE tier IS NOT NULL")
            .fetch_one(pool),
        sqlx::query_as::<_, StatusCountRow>(
            "SELECT status, COUNT(*) as count FROM contact_submissions GROUP BY status",
        )
        .fetch_all(pool),
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'sent'),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM email_log
            WHERE created_at > NOW() - interval '7 days'
            "#,
        )
        .fetch_one(pool),
        sqlx::query_as::<_, RecentOrder>(
            r#"
            SELECT id, customer_email, package_type, amount_cents, status, created_at
            FROM orders
            ORDER BY created_at DESC
            LIMIT 10
            "#,
        )
        .fetch_all(pool),
    )?;

    let orders_by_status = order_counts
        .into_iter()
        .map(|row| (row.status, row.count))
        .collect();
    let contact_by_status = contact_counts
        .into_iter()
        .map(|row| (row.status, row.count))
        .collect();

    Ok(Json(AnalyticsResponse {
        total_revenue_cents: total_revenue.0,
        revenue_30d_cents: revenue_30d.0,
        orders_by_status,
        total_customers: total_customers.0,
        active_subscribers: active_subscribers.0,
        contact_by_status,
        emails_sent_7d: email_counts.0,
        emails_failed_7d: email_counts.1,
        recent_orders,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListWebhooksQuery {
    pub processed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WebhookListResponse {
    pub events: Vec<WebhookEventRecord>,
}

/// GET /api/admin/webhooks
pub async fn list_webhook_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListWebhooksQuery>,
) -> ApiResult<Json<WebhookListResponse>> {
    require_admin_token(&state, &headers)?;
    let billing = state.billing_service()?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let events = billing
        .events
        .list(query.processed, limit, offset)
        .await?;

    Ok(Json(WebhookListResponse { events }))
}
