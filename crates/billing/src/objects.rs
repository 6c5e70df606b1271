//! Stripe webhook payload types
//!
//! Inbound events are deserialized from the raw request body with these
//! types rather than re-serialized through the SDK: signature verification
//! is byte-sensitive, and the handlers only need a narrow slice of each
//! object. Unknown fields are ignored for forward compatibility.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Parsed `Stripe-Signature` header: `t=<timestamp>,v1=<hex sig>[,v0=...]`.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse the signature header. Unknown schemes (v0 and future) are
    /// ignored; only `t` and `v1` are required.
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part.split_once('=')?;
            match key.trim() {
                "t" => timestamp = value.trim().parse().ok(),
                "v1" => v1_signature = hex::decode(value.trim()).ok(),
                _ => {}
            }
        }

        Some(Self {
            timestamp: timestamp?,
            v1_signature: v1_signature?,
        })
    }
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Provider-assigned event identifier (`evt_...`) — the idempotency key.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The affected object; deserialized per event type by the handlers.
    pub object: serde_json::Value,
}

/// Checkout Session as delivered in `checkout.session.completed`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CheckoutCustomerDetails>,
    pub subscription: Option<String>,
    /// `paid`, `unpaid`, or `no_payment_required`.
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl CheckoutSessionObject {
    /// Customer email, preferring the checkout-entered details over the
    /// pre-filled session email.
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_details.as_ref().and_then(|d| d.name.as_deref())
    }
}

/// Subscription as delivered in `customer.subscription.*` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: PriceObject,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceObject {
    pub id: String,
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub currency: String,
}

impl SubscriptionObject {
    /// Price ID of the first subscription item, used for tier lookup when
    /// the subscription metadata carries no explicit tier.
    pub fn first_price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// PaymentIntent as delivered in `payment_intent.succeeded` / `.payment_failed`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl PaymentIntentObject {
    /// The checkout session this intent belongs to, stashed in its metadata
    /// when the session was created.
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.get("stripe_session_id").map(String::as_str)
    }
}

/// Invoice as delivered in `invoice.payment_succeeded`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_signature_header() {
        let parsed = SignatureHeader::parse("t=1704067200,v1=5d41402abc4b2a76b9719d911017c592")
            .expect("valid header");
        assert_eq!(parsed.timestamp, 1704067200);
        assert_eq!(
            hex::encode(&parsed.v1_signature),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn parse_signature_header_ignores_v0() {
        let parsed =
            SignatureHeader::parse("t=1704067200,v1=aabbccdd,v0=deadbeef").expect("valid header");
        assert_eq!(hex::encode(&parsed.v1_signature), "aabbccdd");
    }

    #[test]
    fn parse_signature_header_missing_parts() {
        assert!(SignatureHeader::parse("").is_none());
        assert!(SignatureHeader::parse("v1=aabbccdd").is_none());
        assert!(SignatureHeader::parse("t=1704067200").is_none());
        assert!(SignatureHeader::parse("t=notanumber,v1=aabbccdd").is_none());
        assert!(SignatureHeader::parse("t=1704067200,v1=zzzz").is_none());
    }

    #[test]
    fn parse_checkout_session_event() {
        let json = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "livemode": false,
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "customer": "cus_123",
                    "customer_email": "prefill@example.com",
                    "customer_details": {"email": "john@example.com", "name": "John Doe"},
                    "subscription": null,
                    "payment_status": "paid",
                    "amount_total": 450000,
                    "currency": "usd",
                    "mode": "payment",
                    "metadata": {"package_type": "core"}
                }
            }
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");

        let session: CheckoutSessionObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.email(), Some("john@example.com"));
        assert_eq!(session.customer_name(), Some("John Doe"));
        assert_eq!(session.metadata.get("package_type").unwrap(), "core");
        assert_eq!(session.payment_status, "paid");
    }

    #[test]
    fn parse_subscription_with_items() {
        let json = r#"{
            "id": "sub_1",
            "customer": "cus_123",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_end": 1706745600,
            "metadata": {},
            "items": {
                "data": [
                    {"id": "si_1", "price": {"id": "price_growth_monthly", "unit_amount": 150000, "currency": "usd"}}
                ]
            }
        }"#;

        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert_eq!(sub.first_price_id(), Some("price_growth_monthly"));
    }

    #[test]
    fn parse_subscription_without_items() {
        let json = r#"{"id": "sub_2", "customer": "cus_9", "status": "canceled"}"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert!(sub.first_price_id().is_none());
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn payment_intent_session_lookup() {
        let json = r#"{
            "id": "pi_1",
            "amount": 95000,
            "currency": "usd",
            "status": "succeeded",
            "metadata": {"stripe_session_id": "cs_test_xyz"},
            "last_payment_error": null
        }"#;

        let intent: PaymentIntentObject = serde_json::from_str(json).unwrap();
        assert_eq!(intent.session_id(), Some("cs_test_xyz"));
    }
}
