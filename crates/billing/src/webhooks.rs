//! Stripe webhook handling
//!
//! One pipeline for every inbound event: verify the signature over the raw
//! body, write the event-log row, dispatch to the handler for the event
//! type, then finalize the log row with the outcome. Handlers run
//! sequentially within a delivery; the provider's redelivery (driven by our
//! HTTP status) is the only retry mechanism.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;

use crate::checkout::Offering;
use crate::client::StripeClient;
use crate::customer::CustomerService;
use crate::email::EmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::EventLog;
use crate::fulfillment::FulfillmentClient;
use crate::objects::{
    CheckoutSessionObject, InvoiceObject, PaymentIntentObject, SignatureHeader, StripeEvent,
    SubscriptionObject,
};
use crate::orders::{NewOrder, OrderService};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// How a given event type is processed.
///
/// The mapping is total: unknown types resolve to `NoOp`, which acknowledges
/// the delivery without treating it as an error — the provider adds event
/// types we have no reason to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    CheckoutCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    PaymentSucceeded,
    PaymentFailed,
    /// Receipts are issued by the payment provider; nothing to persist.
    /// A deliberate no-op, not a missing case.
    InvoicePaymentSucceeded,
    NoOp,
}

impl Handler {
    pub fn for_event_type(event_type: &str) -> Handler {
        match event_type {
            "checkout.session.completed" => Handler::CheckoutCompleted,
            "customer.subscription.created" => Handler::SubscriptionCreated,
            "customer.subscription.updated" => Handler::SubscriptionUpdated,
            "customer.subscription.deleted" => Handler::SubscriptionDeleted,
            "payment_intent.succeeded" => Handler::PaymentSucceeded,
            "payment_intent.payment_failed" => Handler::PaymentFailed,
            "invoice.payment_succeeded" => Handler::InvoicePaymentSucceeded,
            _ => Handler::NoOp,
        }
    }
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    event_log: EventLog,
    customers: CustomerService,
    orders: OrderService,
    email: EmailService,
    fulfillment: FulfillmentClient,
}

impl WebhookHandler {
    pub fn new(
        stripe: StripeClient,
        pool: PgPool,
        email: EmailService,
        fulfillment: FulfillmentClient,
    ) -> Self {
        Self {
            stripe,
            event_log: EventLog::new(pool.clone()),
            customers: CustomerService::new(pool.clone()),
            orders: OrderService::new(pool),
            email,
            fulfillment,
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Verify and parse a webhook payload.
    ///
    /// Verification runs over the raw body bytes as received: re-serializing
    /// the JSON can change byte content and invalidate the HMAC. Nothing is
    /// persisted for a payload that fails here.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<StripeEvent> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.verify_event_at(payload, signature, now)
    }

    fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now: i64,
    ) -> BillingResult<StripeEvent> {
        let header = SignatureHeader::parse(signature).ok_or_else(|| {
            tracing::warn!("Malformed Stripe-Signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if (now - header.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = header.timestamp,
                now = now,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        // The signing secret's "whsec_" prefix is not part of the key
        let webhook_secret = &self.stripe.config().webhook_secret;
        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);

        let signed_payload = format!("{}.{}", header.timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = mac.finalize().into_bytes();

        if computed.ct_eq(header.v1_signature.as_slice()).unwrap_u8() != 1 {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: StripeEvent = serde_json::from_str(payload).map_err(|e| {
            tracing::warn!(parse_error = %e, "Signed payload is not a valid event");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Run the pipeline for a verified event: log, dispatch, finalize.
    pub async fn handle_event(&self, event: StripeEvent) -> BillingResult<()> {
        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        // Optional upfront idempotency: with dedupe enabled, a successfully
        // processed event_id is acknowledged without re-running handlers.
        // With it disabled (the default), redelivery re-runs handlers and
        // duplicate orders surface as unique-constraint conflicts.
        if self.stripe.config().dedupe_events {
            match self.event_log.already_processed(&event_id).await {
                Ok(true) => {
                    tracing::info!(
                        event_id = %event_id,
                        event_type = %event_type,
                        "Duplicate event already processed; skipping"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(event_id = %event_id, error = %e, "Dedupe lookup failed");
                }
            }
        }

        // Initial log write, processed=false. A failed write must not abort
        // the pipeline; it is surfaced to operational logs only.
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        if let Err(e) = self
            .event_log
            .record_received(&event_id, &event_type, &payload)
            .await
        {
            tracing::error!(
                event_id = %event_id,
                event_type = %event_type,
                error = %e,
                "Failed to record webhook event"
            );
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event_type,
            "Processing webhook event"
        );

        let result = self.process_event_internal(&event).await;

        // Final log write with the outcome. Retried once: the audit row is
        // what redelivery diagnosis relies on.
        let error_message = result.as_ref().err().map(|e| e.to_string());
        if let Err(e) = self
            .event_log
            .finalize(&event_id, error_message.as_deref())
            .await
        {
            tracing::warn!(event_id = %event_id, error = %e, "Event finalize failed, retrying");
            if let Err(retry_err) = self
                .event_log
                .finalize(&event_id, error_message.as_deref())
                .await
            {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error_message = ?error_message,
                    retry_error = %retry_err,
                    "Failed to finalize webhook event record after retry"
                );
            }
        }

        result
    }

    async fn process_event_internal(&self, event: &StripeEvent) -> BillingResult<()> {
        match Handler::for_event_type(&event.event_type) {
            Handler::CheckoutCompleted => {
                let session = self.extract::<CheckoutSessionObject>(event)?;
                self.handle_checkout_completed(session).await
            }
            Handler::SubscriptionCreated | Handler::SubscriptionUpdated => {
                let subscription = self.extract::<SubscriptionObject>(event)?;
                self.handle_subscription_changed(subscription).await
            }
            Handler::SubscriptionDeleted => {
                let subscription = self.extract::<SubscriptionObject>(event)?;
                self.handle_subscription_deleted(subscription).await
            }
            Handler::PaymentSucceeded => {
                let intent = self.extract::<PaymentIntentObject>(event)?;
                self.handle_payment_intent(intent, true).await
            }
            Handler::PaymentFailed => {
                let intent = self.extract::<PaymentIntentObject>(event)?;
                self.handle_payment_intent(intent, false).await
            }
            Handler::InvoicePaymentSucceeded => {
                let invoice = self.extract::<InvoiceObject>(event)?;
                tracing::info!(
                    invoice_id = %invoice.id,
                    amount_paid = ?invoice.amount_paid,
                    "Invoice payment succeeded (no persistence side effect)"
                );
                Ok(())
            }
            Handler::NoOp => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Received unhandled event type - no handler configured"
                );
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, session: CheckoutSessionObject) -> BillingResult<()> {
        if session.payment_status != "paid" {
            tracing::info!(
                session_id = %session.id,
                payment_status = %session.payment_status,
                "Checkout completed without payment; nothing to record"
            );
            return Ok(());
        }

        let email = session.email().ok_or_else(|| {
            BillingError::Internal(format!("checkout session {} has no customer email", session.id))
        })?;
        let name = session
            .customer_name()
            .or_else(|| session.metadata.get("customer_name").map(String::as_str))
            .unwrap_or("");
        let package_type = session
            .metadata
            .get("package_type")
            .cloned()
            .unwrap_or_else(|| "custom".to_string());
        let amount = session.amount_total.unwrap_or(0);
        let currency = session.currency.as_deref().unwrap_or("usd");

        let customer = self
            .customers
            .upsert_from_checkout(email, name, session.customer.as_deref(), amount)
            .await?;

        let order = self
            .orders
            .create(NewOrder {
                stripe_session_id: &session.id,
                customer_name: name,
                customer_email: email,
                package_type: &package_type,
                amount_cents: amount,
                currency,
                status: "paid",
                metadata: serde_json::to_value(&session.metadata)
                    .unwrap_or(serde_json::Value::Null),
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %customer.id,
            package_type = %package_type,
            amount_cents = amount,
            "Order recorded from completed checkout"
        );

        if Offering::is_deliverable(&package_type) {
            self.kick_off_order(order.id, &session.id, &package_type, email, name)
                .await;
        }

        Ok(())
    }

    /// Start delivery of a deliverable order: kickoff email plus the
    /// downstream fulfillment call. Failures here are logged but do not fail
    /// the event — a redelivery would only re-run the order insert into a
    /// guaranteed conflict.
    async fn kick_off_order(
        &self,
        order_id: uuid::Uuid,
        session_id: &str,
        package_type: &str,
        email: &str,
        name: &str,
    ) {
        let display_name = if name.is_empty() { "there" } else { name };
        if let Err(e) = self
            .email
            .send_order_kickoff(email, display_name, package_type)
            .await
        {
            tracing::error!(order_id = %order_id, error = %e, "Failed to send kickoff email");
        }

        match self
            .fulfillment
            .notify_order_paid(order_id, session_id, package_type, email)
            .await
        {
            Ok(true) => {
                if let Err(e) = self
                    .orders
                    .set_fulfillment_status(order_id, "processing")
                    .await
                {
                    tracing::error!(order_id = %order_id, error = %e, "Failed to advance fulfillment status");
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Fulfillment notification failed");
            }
        }
    }

    async fn handle_subscription_changed(
        &self,
        subscription: SubscriptionObject,
    ) -> BillingResult<()> {
        let tier_map = self.stripe.config().price_ids.tier_map();
        let Some(tier) = resolve_tier(&subscription, &tier_map) else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Subscription carries no resolvable tier"
            );
            return Ok(());
        };

        let updated = self
            .customers
            .set_tier_by_stripe_customer(&subscription.customer, Some(&tier))
            .await?;

        if updated {
            tracing::info!(
                subscription_id = %subscription.id,
                stripe_customer_id = %subscription.customer,
                tier = %tier,
                "Customer tier updated"
            );
        } else {
            // Checkout-completed for the same purchase may not have landed
            // yet; the provider's subscription.updated redeliveries converge
            // the tier once the customer row exists.
            tracing::warn!(
                subscription_id = %subscription.id,
                stripe_customer_id = %subscription.customer,
                "No customer row for subscription's Stripe customer"
            );
        }

        Ok(())
    }

    async fn handle_subscription_deleted(
        &self,
        subscription: SubscriptionObject,
    ) -> BillingResult<()> {
        // Clear the tier; the customer row and its history are kept.
        self.customers
            .set_tier_by_stripe_customer(&subscription.customer, None)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            stripe_customer_id = %subscription.customer,
            "Subscription deleted, tier cleared"
        );

        match self
            .customers
            .email_for_stripe_customer(&subscription.customer)
            .await
        {
            Ok(Some(email)) => {
                if let Err(e) = self.email.send_subscription_cancelled(&email).await {
                    tracing::error!(error = %e, "Failed to send cancellation email");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Customer email lookup failed for cancellation notice");
            }
        }

        Ok(())
    }

    async fn handle_payment_intent(
        &self,
        intent: PaymentIntentObject,
        succeeded: bool,
    ) -> BillingResult<()> {
        let Some(session_id) = intent.session_id() else {
            tracing::warn!(
                payment_intent_id = %intent.id,
                "Payment intent carries no session reference; skipping order update"
            );
            return Ok(());
        };

        let status = if succeeded { "paid" } else { "failed" };
        let order = self.orders.set_status_by_session(session_id, status).await?;

        if succeeded {
            tracing::info!(
                order_id = %order.id,
                payment_intent_id = %intent.id,
                "Order marked paid"
            );

            if Offering::is_deliverable(&order.package_type) && order.fulfillment_status == "pending"
            {
                match self
                    .fulfillment
                    .notify_order_paid(
                        order.id,
                        &order.stripe_session_id,
                        &order.package_type,
                        &order.customer_email,
                    )
                    .await
                {
                    Ok(true) => {
                        if let Err(e) = self
                            .orders
                            .set_fulfillment_status(order.id, "processing")
                            .await
                        {
                            tracing::error!(order_id = %order.id, error = %e, "Failed to advance fulfillment status");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(order_id = %order.id, error = %e, "Fulfillment notification failed");
                    }
                }
            }
        } else {
            let reason = intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.as_deref())
                .unwrap_or("unknown");
            // Customer-facing failure notification is handled manually by
            // staff for now; the log line is the trigger.
            tracing::warn!(
                order_id = %order.id,
                payment_intent_id = %intent.id,
                reason = %reason,
                "Order payment failed; customer should be contacted"
            );
        }

        Ok(())
    }

    fn extract<T: serde::de::DeserializeOwned>(&self, event: &StripeEvent) -> BillingResult<T> {
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            BillingError::WebhookEventNotSupported(format!(
                "{} payload did not match expected object: {}",
                event.event_type, e
            ))
        })
    }
}

/// Resolve a subscription's tier: explicit metadata wins, then the injected
/// price-id map; None when neither knows the subscription.
pub fn resolve_tier(
    subscription: &SubscriptionObject,
    tier_map: &HashMap<String, String>,
) -> Option<String> {
    if let Some(tier) = subscription.metadata.get("tier") {
        return Some(tier.clone());
    }

    subscription
        .first_price_id()
        .and_then(|price_id| tier_map.get(price_id))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PriceIds, StripeConfig};

    fn test_handler() -> WebhookHandler {
        let config = StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test_secret".to_string(),
            price_ids: PriceIds::default(),
            checkout_success_url: "https://example.com/thanks".to_string(),
            checkout_cancel_url: "https://example.com/pricing".to_string(),
            dedupe_events: false,
        };
        let stripe = StripeClient::new(config);
        let pool =
            sqlx::PgPool::connect_lazy("postgres://localhost/ridgeline_test").expect("lazy pool");
        let email = EmailService::from_env(pool.clone());
        let fulfillment = FulfillmentClient::new(None);
        WebhookHandler::new(stripe, pool, email, fulfillment)
    }

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    const PAYLOAD: &str = r#"{
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "created": 1704067200,
        "livemode": false,
        "data": {"object": {"id": "cs_1", "payment_status": "paid"}}
    }"#;

    #[tokio::test]
    async fn verify_event_accepts_valid_signature() {
        let handler = test_handler();
        let now = 1704067200;
        let header = sign(PAYLOAD, now, "test_secret");

        let event = handler.verify_event_at(PAYLOAD, &header, now).unwrap();
        assert_eq!(event.id, "evt_test_1");
        assert_eq!(event.event_type, "checkout.session.completed");
    }

    #[tokio::test]
    async fn verify_event_rejects_tampered_body() {
        let handler = test_handler();
        let now = 1704067200;
        let header = sign(PAYLOAD, now, "test_secret");
        let tampered = PAYLOAD.replace("paid", "free");

        let result = handler.verify_event_at(&tampered, &header, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[tokio::test]
    async fn verify_event_rejects_wrong_secret() {
        let handler = test_handler();
        let now = 1704067200;
        let header = sign(PAYLOAD, now, "some_other_secret");

        let result = handler.verify_event_at(PAYLOAD, &header, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[tokio::test]
    async fn verify_event_rejects_stale_timestamp() {
        let handler = test_handler();
        let signed_at = 1704067200;
        let header = sign(PAYLOAD, signed_at, "test_secret");

        // Six minutes later, past the five-minute tolerance
        let result = handler.verify_event_at(PAYLOAD, &header, signed_at + 360);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[tokio::test]
    async fn verify_event_accepts_timestamp_within_tolerance() {
        let handler = test_handler();
        let signed_at = 1704067200;
        let header = sign(PAYLOAD, signed_at, "test_secret");

        assert!(handler
            .verify_event_at(PAYLOAD, &header, signed_at + 299)
            .is_ok());
    }

    #[tokio::test]
    async fn verify_event_rejects_malformed_header() {
        let handler = test_handler();
        for header in ["", "garbage", "t=12345", "v1=aabb"] {
            let result = handler.verify_event_at(PAYLOAD, header, 12345);
            assert!(
                matches!(result, Err(BillingError::WebhookSignatureInvalid)),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn dispatcher_maps_known_event_types() {
        assert_eq!(
            Handler::for_event_type("checkout.session.completed"),
            Handler::CheckoutCompleted
        );
        assert_eq!(
            Handler::for_event_type("customer.subscription.created"),
            Handler::SubscriptionCreated
        );
        assert_eq!(
            Handler::for_event_type("customer.subscription.updated"),
            Handler::SubscriptionUpdated
        );
        assert_eq!(
            Handler::for_event_type("customer.subscription.deleted"),
            Handler::SubscriptionDeleted
        );
        assert_eq!(
            Handler::for_event_type("payment_intent.succeeded"),
            Handler::PaymentSucceeded
        );
        assert_eq!(
            Handler::for_event_type("payment_intent.payment_failed"),
            Handler::PaymentFailed
        );
    }

    #[test]
    fn dispatcher_routes_invoice_payment_to_documented_noop() {
        assert_eq!(
            Handler::for_event_type("invoice.payment_succeeded"),
            Handler::InvoicePaymentSucceeded
        );
    }

    #[test]
    fn dispatcher_maps_unknown_types_to_noop() {
        for t in ["charge.refunded", "customer.created", "price.updated", ""] {
            assert_eq!(Handler::for_event_type(t), Handler::NoOp, "type {:?}", t);
        }
    }

    #[test]
    fn resolve_tier_prefers_metadata() {
        let json = r#"{
            "id": "sub_1", "customer": "cus_1", "status": "active",
            "metadata": {"tier": "partner"},
            "items": {"data": [{"id": "si_1", "price": {"id": "price_lite", "unit_amount": 500, "currency": "usd"}}]}
        }"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();

        let mut map = HashMap::new();
        map.insert("price_lite".to_string(), "lite".to_string());

        assert_eq!(resolve_tier(&sub, &map), Some("partner".to_string()));
    }

    #[test]
    fn resolve_tier_falls_back_to_price_map() {
        let json = r#"{
            "id": "sub_2", "customer": "cus_1", "status": "active",
            "items": {"data": [{"id": "si_1", "price": {"id": "price_growth", "unit_amount": 1500, "currency": "usd"}}]}
        }"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();

        let mut map = HashMap::new();
        map.insert("price_growth".to_string(), "growth".to_string());

        assert_eq!(resolve_tier(&sub, &map), Some("growth".to_string()));
    }

    #[test]
    fn resolve_tier_unknown_price_is_none() {
        let json = r#"{"id": "sub_3", "customer": "cus_1", "status": "active"}"#;
        let sub: SubscriptionObject = serde_json::from_str(json).unwrap();

        assert_eq!(resolve_tier(&sub, &HashMap::new()), None);
    }
}
