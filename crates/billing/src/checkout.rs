//! Checkout session creation
//!
//! The offering catalog maps a public offering id to a Stripe price, a
//! checkout mode, and the package type recorded on the resulting order.
//! Hosted checkout handles card entry; we only mint the session and hand
//! back its URL.

use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionDiscounts,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionPaymentIntentData, Metadata,
    UpdatePaymentIntent,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Whether an offering bills once or recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferingMode {
    OneTime,
    Subscription,
}

/// A purchasable offering.
#[derive(Debug, Clone)]
pub struct Offering {
    pub id: &'static str,
    pub mode: OfferingMode,
    /// Orders for the deliverable product line trigger the kickoff email and
    /// the downstream fulfillment call once paid.
    pub deliverable: bool,
}

/// The catalog: advisory subscriptions plus the one-time core engagement.
pub const OFFERINGS: &[Offering] = &[
    Offering {
        id: "lite",
        mode: OfferingMode::Subscription,
        deliverable: false,
    },
    Offering {
        id: "growth",
        mode: OfferingMode::Subscription,
        deliverable: false,
    },
    Offering {
        id: "partner",
        mode: OfferingMode::Subscription,
        deliverable: false,
    },
    Offering {
        id: "core",
        mode: OfferingMode::OneTime,
        deliverable: true,
    },
];

impl Offering {
    pub fn find(id: &str) -> Option<&'static Offering> {
        OFFERINGS.iter().find(|o| o.id == id)
    }

    /// Whether a package type belongs to the deliverable product line.
    pub fn is_deliverable(package_type: &str) -> bool {
        Offering::find(package_type).map(|o| o.deliverable).unwrap_or(false)
    }
}

/// Request to create a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub offering_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub promo_code: Option<String>,
    pub test: bool,
}

/// Response with the hosted payment page URL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Resolve the configured price id for an offering.
    fn price_id(&self, offering: &Offering) -> BillingResult<String> {
        let prices = &self.stripe.config().price_ids;
        let price = match offering.id {
            "lite" => &prices.lite,
            "growth" => &prices.growth,
            "partner" => &prices.partner,
            "core" => &prices.core,
            other => {
                return Err(BillingError::Internal(format!(
                    "offering {} missing from price config",
                    other
                )))
            }
        };

        if price.is_empty() {
            return Err(BillingError::Configuration(format!(
                "no Stripe price configured for offering {}",
                offering.id
            )));
        }

        Ok(price.clone())
    }

    /// Create a hosted checkout session for the given offering.
    pub async fn create_session(&self, req: &CheckoutRequest) -> BillingResult<CheckoutResponse> {
        let offering = Offering::find(&req.offering_id).ok_or_else(|| {
            BillingError::InvalidInput(format!("unknown offering: {}", req.offering_id))
        })?;

        let price_id = self.price_id(offering)?;
        let config = self.stripe.config();

        let mut metadata = Metadata::new();
        metadata.insert("package_type".to_string(), offering.id.to_string());
        metadata.insert("customer_name".to_string(), req.customer_name.clone());
        if req.test {
            metadata.insert("test".to_string(), "true".to_string());
        }

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&config.checkout_success_url);
        params.cancel_url = Some(&config.checkout_cancel_url);
        params.customer_email = Some(&req.customer_email);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(metadata.clone());

        params.mode = Some(match offering.mode {
            OfferingMode::OneTime => CheckoutSessionMode::Payment,
            OfferingMode::Subscription => CheckoutSessionMode::Subscription,
        });

        if offering.mode == OfferingMode::OneTime {
            params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
                metadata: Some(metadata),
                ..Default::default()
            });
        }

        match &req.promo_code {
            Some(code) => {
                params.discounts = Some(vec![CreateCheckoutSessionDiscounts {
                    promotion_code: Some(code.clone()),
                    ..Default::default()
                }]);
            }
            None => {
                params.allow_promotion_codes = Some(true);
            }
        }

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        // One-time sessions create their payment intent up front; stash the
        // session id in its metadata so payment_intent.* events can find the
        // order later.
        if offering.mode == OfferingMode::OneTime {
            if let Some(intent) = &session.payment_intent {
                let intent_id = intent.id();

                let mut intent_metadata = Metadata::new();
                intent_metadata
                    .insert("stripe_session_id".to_string(), session.id.to_string());
                intent_metadata.insert("package_type".to_string(), offering.id.to_string());

                let update = UpdatePaymentIntent {
                    metadata: Some(intent_metadata),
                    ..Default::default()
                };

                if let Err(e) =
                    stripe::PaymentIntent::update(self.stripe.inner(), &intent_id, update).await
                {
                    tracing::warn!(
                        session_id = %session.id,
                        error = %e,
                        "Failed to stash session id on payment intent"
                    );
                }
            }
        }

        let url = session.url.clone().ok_or_else(|| {
            BillingError::StripeApi("checkout session created without a URL".to_string())
        })?;

        tracing::info!(
            session_id = %session.id,
            offering = %offering.id,
            customer_email = %req.customer_email,
            "Checkout session created"
        );

        Ok(CheckoutResponse { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_resolves_known_offerings() {
        for id in ["lite", "growth", "partner", "core"] {
            assert!(Offering::find(id).is_some(), "missing offering {}", id);
        }
        assert!(Offering::find("enterprise").is_none());
    }

    #[test]
    fn only_core_is_deliverable() {
        assert!(Offering::is_deliverable("core"));
        assert!(!Offering::is_deliverable("lite"));
        assert!(!Offering::is_deliverable("growth"));
        assert!(!Offering::is_deliverable("unknown"));
    }

    #[test]
    fn subscription_offerings_use_subscription_mode() {
        for id in ["lite", "growth", "partner"] {
            let offering = Offering::find(id).unwrap();
            assert_eq!(offering.mode, OfferingMode::Subscription);
        }
        assert_eq!(Offering::find("core").unwrap().mode, OfferingMode::OneTime);
    }
}
