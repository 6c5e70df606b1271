//! Transactional email via Resend
//!
//! Every send attempt writes one `email_log` row with the outcome. Sends
//! fail closed when the API key is absent: callers decide whether that is
//! fatal (admin notification) or merely logged (courtesy emails inside
//! webhook handlers).

use reqwest::Client;
use sqlx::PgPool;

use crate::error::{BillingError, BillingResult};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from_address: String,
    pub admin_address: String,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Ridgeline Consulting <hello@ridgelineconsulting.com>".to_string()),
            admin_address: std::env::var("ADMIN_EMAIL").unwrap_or_default(),
        }
    }
}

/// Outbound transactional email service.
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
    http: Client,
    pool: PgPool,
}

impl EmailService {
    pub fn new(config: EmailConfig, pool: PgPool) -> Self {
        Self {
            config,
            http: Client::new(),
            pool,
        }
    }

    pub fn from_env(pool: PgPool) -> Self {
        Self::new(EmailConfig::from_env(), pool)
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn admin_address(&self) -> Option<&str> {
        if self.config.admin_address.is_empty() {
            None
        } else {
            Some(&self.config.admin_address)
        }
    }

    /// Send one email and record the attempt in `email_log`.
    pub async fn send(
        &self,
        recipient: &str,
        subject: &str,
        template: &str,
        html: &str,
    ) -> BillingResult<()> {
        if !self.is_enabled() {
            self.log_attempt(recipient, subject, template, Some("email service not configured"))
                .await;
            return Err(BillingError::EmailNotConfigured);
        }

        let body = serde_json::json!({
            "from": self.config.from_address,
            "to": [recipient],
            "subject": subject,
            "html": html,
        });

        let result = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                Err(BillingError::EmailApi(format!("{}: {}", status, detail)))
            }
            Err(e) => Err(BillingError::EmailApi(e.to_string())),
        };

        let error_message = outcome.as_ref().err().map(|e| e.to_string());
        self.log_attempt(recipient, subject, template, error_message.as_deref())
            .await;

        outcome
    }

    /// Notify staff about a new contact submission.
    pub async fn send_contact_notification(
        &self,
        name: &str,
        email: &str,
        topic: Option<&str>,
        message: &str,
    ) -> BillingResult<()> {
        let admin = self
            .admin_address()
            .ok_or(BillingError::EmailNotConfigured)?
            .to_string();

        let html = format!(
            "<h2>New contact submission</h2>\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Topic:</strong> {}</p>\
             <p>{}</p>",
            name,
            email,
            topic.unwrap_or("(none)"),
            message
        );

        self.send(&admin, "New contact submission", "contact_notification", &html)
            .await
    }

    /// Kick off a newly paid engagement.
    pub async fn send_order_kickoff(
        &self,
        recipient: &str,
        customer_name: &str,
        package_type: &str,
    ) -> BillingResult<()> {
        let subject = "Your engagement is underway";
        let html = format!(
            "<p>Hi {},</p>\
             <p>Thanks for your purchase. Your <strong>{}</strong> engagement is \
             confirmed and our team will reach out within one business day to \
             schedule the kickoff call.</p>\
             <p>— Ridgeline Consulting</p>",
            customer_name, package_type
        );

        self.send(recipient, subject, "order_kickoff", &html).await
    }

    /// Confirm a subscription cancellation.
    pub async fn send_subscription_cancelled(&self, recipient: &str) -> BillingResult<()> {
        let subject = "Your subscription has been cancelled";
        let html = "<p>Your subscription has been cancelled. You keep access \
                    until the end of the current billing period.</p>\
                    <p>— Ridgeline Consulting</p>";

        self.send(recipient, subject, "subscription_cancelled", html)
            .await
    }

    /// Daily operations digest for staff.
    pub async fn send_admin_digest(&self, html: &str) -> BillingResult<()> {
        let admin = self
            .admin_address()
            .ok_or(BillingError::EmailNotConfigured)?
            .to_string();

        self.send(&admin, "Daily digest", "admin_digest", html).await
    }

    /// Record an email attempt; a failed log write is surfaced to the
    /// operational log only, never to the caller.
    async fn log_attempt(
        &self,
        recipient: &str,
        subject: &str,
        template: &str,
        error_message: Option<&str>,
    ) {
        let status = if error_message.is_none() { "sent" } else { "failed" };

        let result = sqlx::query(
            r#"
            INSERT INTO email_log (recipient, subject, template, status, error_message, sent_at)
            VALUES ($1, $2, $3, $4, $5, CASE WHEN $5::TEXT IS NULL THEN NOW() ELSE NULL END)
            "#,
        )
        .bind(recipient)
        .bind(subject)
        .bind(template)
        .bind(status)
        .bind(error_message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                recipient = %recipient,
                template = %template,
                error = %e,
                "Failed to write email_log row"
            );
        }
    }
}
