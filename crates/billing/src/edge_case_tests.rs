// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Pipeline
//!
//! Boundary conditions in:
//! - Webhook payload parsing (WEB-01 to WEB-06)
//! - Tier resolution (TIER-01 to TIER-03)
//! - Offering catalog (CAT-01 to CAT-03)
//! - Error classification (ERR-01 to ERR-02)

#[cfg(test)]
mod webhook_payload_tests {
    use crate::objects::*;

    // =========================================================================
    // WEB-01: Event with unknown extra fields - must still parse
    // =========================================================================
    #[test]
    fn event_with_unknown_fields_parses() {
        let json = r#"{
            "id": "evt_extra",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "livemode": false,
            "api_version": "2024-06-20",
            "pending_webhooks": 2,
            "request": {"id": "req_1", "idempotency_key": null},
            "data": {"object": {"id": "cs_1", "payment_status": "paid"}, "previous_attributes": {}}
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "evt_extra");
    }

    // =========================================================================
    // WEB-02: Session with no customer_details falls back to customer_email
    // =========================================================================
    #[test]
    fn session_email_fallback_order() {
        let json = r#"{
            "id": "cs_2",
            "customer": null,
            "customer_email": "prefill@example.com",
            "customer_details": null,
            "subscription": null,
            "payment_status": "paid",
            "amount_total": 100,
            "currency": "usd",
            "mode": "payment"
        }"#;

        let session: CheckoutSessionObject = serde_json::from_str(json).unwrap();
        assert_eq!(session.email(), Some("prefill@example.com"));
        assert_eq!(session.customer_name(), None);
    }

    // =========================================================================
    // WEB-03: Session with neither email source yields None
    // =========================================================================
    #[test]
    fn session_without_email_yields_none() {
        let json = r#"{"id": "cs_3", "payment_status": "paid"}"#;
        let session: CheckoutSessionObject = serde_json::from_str(json).unwrap();
        assert_eq!(session.email(), None);
        assert!(session.metadata.is_empty());
    }

    // =========================================================================
    // WEB-04: Payment intent without the session stash
    // =========================================================================
    #[test]
    fn payment_intent_without_session_reference() {
        let json = r#"{
            "id": "pi_bare",
            "amount": 5000,
            "currency": "usd",
            "status": "succeeded",
            "metadata": {"other_key": "value"}
        }"#;

        let intent: PaymentIntentObject = serde_json::from_str(json).unwrap();
        assert_eq!(intent.session_id(), None);
    }

    // =========================================================================
    // WEB-05: Payment intent failure carries the decline detail
    // =========================================================================
    #[test]
    fn payment_intent_failure_detail() {
        let json = r#"{
            "id": "pi_fail",
            "amount": 5000,
            "currency": "usd",
            "status": "requires_payment_method",
            "metadata": {"stripe_session_id": "cs_9"},
            "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
        }"#;

        let intent: PaymentIntentObject = serde_json::from_str(json).unwrap();
        let err = intent.last_payment_error.unwrap();
        assert_eq!(err.code.as_deref(), Some("card_declined"));
    }

    // =========================================================================
    // WEB-06: Event payload round-trips through serde_json::Value, so the
    // stored event-log payload preserves the envelope
    // =========================================================================
    #[test]
    fn event_payload_roundtrips_for_storage() {
        let json = r#"{
            "id": "evt_store",
            "type": "customer.subscription.deleted",
            "created": 1704067200,
            "livemode": true,
            "data": {"object": {"id": "sub_1", "customer": "cus_1", "status": "canceled"}}
        }"#;

        let event: StripeEvent = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["id"], "evt_store");
        assert_eq!(value["type"], "customer.subscription.deleted");
        assert_eq!(value["data"]["object"]["customer"], "cus_1");
    }
}

#[cfg(test)]
mod tier_resolution_tests {
    use crate::objects::SubscriptionObject;
    use crate::webhooks::resolve_tier;
    use std::collections::HashMap;

    fn tier_map() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("price_lite".to_string(), "lite".to_string());
        map.insert("price_growth".to_string(), "growth".to_string());
        map
    }

    // =========================================================================
    // TIER-01: Metadata tier wins even when the price also maps
    // =========================================================================
    #[test]
    fn metadata_beats_price_map() {
        let json = r#"{
            "id": "s", "customer": "c", "status": "active",
            "metadata": {"tier": "growth"},
            "items": {"data": [{"id": "si", "price": {"id": "price_lite", "unit_amount": 1, "currency": "usd"}}]}
        }"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert_eq!(resolve_tier(&sub, &tier_map()), Some("growth".to_string()));
    }

    // =========================================================================
    // TIER-02: Multiple items - only the first price is consulted
    // =========================================================================
    #[test]
    fn first_item_price_is_used() {
        let json = r#"{
            "id": "s", "customer": "c", "status": "active",
            "items": {"data": [
                {"id": "si1", "price": {"id": "price_growth", "unit_amount": 1, "currency": "usd"}},
                {"id": "si2", "price": {"id": "price_lite", "unit_amount": 1, "currency": "usd"}}
            ]}
        }"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert_eq!(resolve_tier(&sub, &tier_map()), Some("growth".to_string()));
    }

    // =========================================================================
    // TIER-03: Empty items and empty metadata resolve to nothing
    // =========================================================================
    #[test]
    fn no_signal_resolves_to_none() {
        let json = r#"{"id": "s", "customer": "c", "status": "active"}"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();
        assert_eq!(resolve_tier(&sub, &tier_map()), None);
    }
}

#[cfg(test)]
mod catalog_tests {
    use crate::checkout::{Offering, OfferingMode};

    // =========================================================================
    // CAT-01: Offering lookup is exact, not prefix-based
    // =========================================================================
    #[test]
    fn lookup_is_exact() {
        assert!(Offering::find("lite").is_some());
        assert!(Offering::find("lit").is_none());
        assert!(Offering::find("lite ").is_none());
        assert!(Offering::find("LITE").is_none());
    }

    // =========================================================================
    // CAT-02: Every subscription offering maps to a tier name the webhook
    // side can resolve
    // =========================================================================
    #[test]
    fn subscription_offerings_match_tier_names() {
        use crate::client::PriceIds;

        let prices = PriceIds {
            lite: "p1".into(),
            growth: "p2".into(),
            partner: "p3".into(),
            core: "p4".into(),
        };
        let tiers: Vec<String> = prices.tier_map().values().cloned().collect();

        for offering in crate::checkout::OFFERINGS {
            if offering.mode == OfferingMode::Subscription {
                assert!(
                    tiers.contains(&offering.id.to_string()),
                    "offering {} has no tier mapping",
                    offering.id
                );
            }
        }
    }

    // =========================================================================
    // CAT-03: Deliverable check tolerates unknown package types
    // =========================================================================
    #[test]
    fn deliverable_check_on_unknown_package() {
        assert!(!Offering::is_deliverable("custom"));
        assert!(!Offering::is_deliverable(""));
    }
}

#[cfg(test)]
mod error_tests {
    use crate::error::BillingError;

    // =========================================================================
    // ERR-01: Conflict classification
    // =========================================================================
    #[test]
    fn conflict_classification() {
        assert!(BillingError::Conflict("dup".into()).is_conflict());
        assert!(!BillingError::WebhookSignatureInvalid.is_conflict());
        assert!(!BillingError::Database("x".into()).is_conflict());
    }

    // =========================================================================
    // ERR-02: Error messages meant for HTTP responses stay generic - the
    // signature error names no secrets or internals
    // =========================================================================
    #[test]
    fn signature_error_is_generic() {
        let msg = BillingError::WebhookSignatureInvalid.to_string();
        assert!(!msg.contains("whsec"));
        assert!(!msg.contains("HMAC"));
    }
}
