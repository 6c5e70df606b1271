//! Application state

use std::sync::Arc;

use ridgeline_billing::{BillingService, EmailService};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service; None when Stripe env vars are absent. Endpoints that
    /// need it fail closed with a "not configured" error.
    pub billing: Option<Arc<BillingService>>,
    /// Transactional email, available independently of Stripe configuration.
    pub email: EmailService,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        let email = EmailService::from_env(pool.clone());
        if email.is_enabled() {
            tracing::info!("Email notifications enabled");
        } else {
            tracing::warn!("Email notifications not configured (missing RESEND_API_KEY)");
        }

        Self {
            pool,
            config,
            billing,
            email,
        }
    }

    /// Billing service or a fail-closed configuration error.
    pub fn billing_service(&self) -> Result<&Arc<BillingService>, crate::error::ApiError> {
        self.billing
            .as_ref()
            .ok_or(crate::error::ApiError::NotConfigured("Payment service"))
    }
}
