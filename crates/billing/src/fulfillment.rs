//! Downstream deliverable fulfillment
//!
//! Paid orders for the deliverable product line are pushed to a separate
//! fulfillment endpoint. The call carries a hard 5-second timeout so a slow
//! downstream cannot hang webhook handling; failures are reported to the
//! caller, which decides whether they fail the pipeline.

use std::time::Duration;

use reqwest::Client;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

const FULFILLMENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct FulfillmentClient {
    endpoint: Option<String>,
    http: Client,
}

impl FulfillmentClient {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            http: Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let endpoint = std::env::var("FULFILLMENT_URL").ok().filter(|v| !v.is_empty());
        Self::new(endpoint)
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Notify the fulfillment endpoint that an order is paid and ready for
    /// delivery. Returns Ok(false) when no endpoint is configured.
    pub async fn notify_order_paid(
        &self,
        order_id: Uuid,
        stripe_session_id: &str,
        package_type: &str,
        customer_email: &str,
    ) -> BillingResult<bool> {
        let Some(endpoint) = &self.endpoint else {
            tracing::info!(
                order_id = %order_id,
                "Fulfillment endpoint not configured; skipping downstream call"
            );
            return Ok(false);
        };

        let body = serde_json::json!({
            "order_id": order_id,
            "stripe_session_id": stripe_session_id,
            "package_type": package_type,
            "customer_email": customer_email,
        });

        let response = self
            .http
            .post(endpoint)
            .timeout(FULFILLMENT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| BillingError::Fulfillment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BillingError::Fulfillment(format!(
                "fulfillment endpoint returned {}",
                response.status()
            )));
        }

        tracing::info!(
            order_id = %order_id,
            package_type = %package_type,
            "Fulfillment endpoint notified"
        );

        Ok(true)
    }
}
