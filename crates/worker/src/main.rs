//! Ridgeline Background Worker
//!
//! Handles scheduled jobs including:
//! - Stuck-webhook annotation (every 30 minutes)
//! - Daily admin digest email (06:00 UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use ridgeline_billing::EmailService;
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Events unprocessed for longer than this are flagged for operator review.
const STUCK_EVENT_MINUTES: i64 = 30;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Yesterday's activity, aggregated for the digest email.
#[derive(Debug)]
struct DigestStats {
    orders: i64,
    revenue_cents: i64,
    contacts: i64,
    failed_events: i64,
}

async fn collect_digest_stats(pool: &sqlx::PgPool) -> anyhow::Result<DigestStats> {
    let (orders, revenue_cents): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(amount_cents), 0)::BIGINT
        FROM orders
        WHERE status = 'paid'
          AND created_at >= date_trunc('day', NOW()) - interval '1 day'
          AND created_at < date_trunc('day', NOW())
        "#,
    )
    .fetch_one(pool)
    .await?;

    let (contacts,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM contact_submissions
        WHERE created_at >= date_trunc('day', NOW()) - interval '1 day'
          AND created_at < date_trunc('day', NOW())
        "#,
    )
    .fetch_one(pool)
    .await?;

    let (failed_events,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM webhook_events
        WHERE processed = FALSE AND error_message IS NOT NULL
          AND created_at >= date_trunc('day', NOW()) - interval '1 day'
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(DigestStats {
        orders,
        revenue_cents,
        contacts,
        failed_events,
    })
}

async fn send_daily_digest(pool: &sqlx::PgPool, email: &EmailService) -> anyhow::Result<()> {
    let stats = collect_digest_stats(pool).await?;

    let html = format!(
        "<h2>Yesterday at a glance</h2>\
         <ul>\
         <li><strong>Paid orders:</strong> {}</li>\
         <li><strong>Revenue:</strong> ${:.2}</li>\
         <li><strong>Contact submissions:</strong> {}</li>\
         <li><strong>Failed webhook events:</strong> {}</li>\
         </ul>",
        stats.orders,
        stats.revenue_cents as f64 / 100.0,
        stats.contacts,
        stats.failed_events,
    );

    email.send_admin_digest(&html).await?;
    info!(
        orders = stats.orders,
        revenue_cents = stats.revenue_cents,
        contacts = stats.contacts,
        "Daily digest sent"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Ridgeline Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    let email = Arc::new(EmailService::from_env(pool.clone()));
    if !email.is_enabled() {
        info!("Email service not configured - digest job will log only");
    }

    let event_log = Arc::new(ridgeline_billing::EventLog::new(pool.clone()));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Flag webhook events stuck unprocessed (every 30 minutes)
    let stuck_log = event_log.clone();
    scheduler
        .add(Job::new_async("0 */30 * * * *", move |_uuid, _l| {
            let log = stuck_log.clone();
            Box::pin(async move {
                match log.annotate_stuck(STUCK_EVENT_MINUTES).await {
                    Ok(0) => {}
                    Ok(count) => {
                        info!(count = count, "Flagged stuck webhook events for review")
                    }
                    Err(e) => error!(error = %e, "Stuck webhook scan failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Stuck webhook scan (every 30 minutes)");

    // Job 2: Daily admin digest (06:00 UTC)
    let digest_pool = pool.clone();
    let digest_email = email.clone();
    scheduler
        .add(Job::new_async("0 0 6 * * *", move |_uuid, _l| {
            let pool = digest_pool.clone();
            let email = digest_email.clone();
            Box::pin(async move {
                if let Err(e) = send_daily_digest(&pool, &email).await {
                    error!(error = %e, "Daily digest failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Daily admin digest (06:00 UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    scheduler.start().await?;
    info!("Worker scheduler started");

    // Keep the process alive; jobs run on the scheduler's timers
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
