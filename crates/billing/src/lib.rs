// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Ridgeline Billing Module
//!
//! Stripe integration for the consulting site: checkout and portal session
//! creation, webhook reconciliation (signature verification, event log,
//! dispatch, side-effect handlers), customer/order persistence,
//! transactional email, and downstream fulfillment.

pub mod checkout;
pub mod client;
pub mod customer;
pub mod email;
pub mod error;
pub mod events;
pub mod fulfillment;
pub mod objects;
pub mod orders;
pub mod portal;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutRequest, CheckoutResponse, CheckoutService, Offering, OfferingMode};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig};

// Customer
pub use customer::{CustomerRecord, CustomerService};

// Email
pub use email::{EmailConfig, EmailService};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{EventLog, WebhookEventRecord};

// Fulfillment
pub use fulfillment::FulfillmentClient;

// Orders
pub use orders::{NewOrder, OrderRecord, OrderService};

// Portal
pub use portal::{PortalResponse, PortalService};

// Webhooks
pub use webhooks::{Handler, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customers: CustomerService,
    pub email: EmailService,
    pub events: EventLog,
    pub fulfillment: FulfillmentClient,
    pub orders: OrderService,
    pub portal: PortalService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_clients(
            stripe,
            pool.clone(),
            EmailService::from_env(pool),
            FulfillmentClient::from_env(),
        ))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        let stripe = StripeClient::new(config);
        Self::with_clients(
            stripe,
            pool.clone(),
            EmailService::from_env(pool),
            FulfillmentClient::from_env(),
        )
    }

    /// Assemble the service from already-constructed clients. The single
    /// place where clients are wired together; everything downstream receives
    /// them by reference.
    pub fn with_clients(
        stripe: StripeClient,
        pool: PgPool,
        email: EmailService,
        fulfillment: FulfillmentClient,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone()),
            customers: CustomerService::new(pool.clone()),
            email: email.clone(),
            events: EventLog::new(pool.clone()),
            fulfillment: fulfillment.clone(),
            orders: OrderService::new(pool.clone()),
            portal: PortalService::new(stripe.clone()),
            webhooks: WebhookHandler::new(stripe, pool, email, fulfillment),
        }
    }
}
