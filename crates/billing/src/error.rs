//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook event not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A unique constraint rejected a write, e.g. a second order insert for
    /// the same checkout session on webhook redelivery.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Email service not configured")]
    EmailNotConfigured,

    #[error("Email API error: {0}")]
    EmailApi(String),

    #[error("Fulfillment request failed: {0}")]
    Fulfillment(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service not configured: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        // Surface unique-constraint violations distinctly: webhook redelivery
        // relies on them to detect duplicate orders (23505 = unique_violation).
        if let sqlx::Error::Database(ref db) = e {
            if db.code().as_deref() == Some("23505") {
                return BillingError::Conflict(db.message().to_string());
            }
        }
        BillingError::Database(e.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}

impl BillingError {
    /// Whether this error is a duplicate-write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, BillingError::Conflict(_))
    }
}
