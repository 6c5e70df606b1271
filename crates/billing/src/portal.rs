//! Customer billing portal sessions

use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Response with the hosted portal URL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Clone)]
pub struct PortalService {
    stripe: StripeClient,
}

impl PortalService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a billing-portal session for subscription self-management.
    pub async fn create_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<PortalResponse> {
        let customer: CustomerId = customer_id
            .parse()
            .map_err(|_| BillingError::InvalidInput(format!("invalid customer id: {}", customer_id)))?;

        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        tracing::info!(customer_id = %customer_id, "Billing portal session created");

        Ok(PortalResponse { url: session.url })
    }
}
