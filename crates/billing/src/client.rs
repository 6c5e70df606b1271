//! Stripe client wrapper and configuration

use std::collections::HashMap;

use crate::error::{BillingError, BillingResult};

/// Stripe price IDs for the offering catalog, loaded from the environment so
/// test/live mode switches require no code change.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub lite: String,
    pub growth: String,
    pub partner: String,
    pub core: String,
}

impl PriceIds {
    /// Price-ID-to-tier lookup used when a subscription carries no explicit
    /// tier in its metadata.
    pub fn tier_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(self.lite.clone(), "lite".to_string());
        map.insert(self.growth.clone(), "growth".to_string());
        map.insert(self.partner.clone(), "partner".to_string());
        map
    }
}

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_ids: PriceIds,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// When true, an already-processed event_id short-circuits the webhook
    /// pipeline before any side effects run. When false (default), redelivery
    /// re-runs handlers and duplicate orders are caught only by the unique
    /// constraint on orders.stripe_session_id.
    pub dedupe_events: bool,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = require_env("STRIPE_SECRET_KEY")?;
        let webhook_secret = require_env("STRIPE_WEBHOOK_SECRET")?;

        let price_ids = PriceIds {
            lite: std::env::var("STRIPE_PRICE_LITE").unwrap_or_default(),
            growth: std::env::var("STRIPE_PRICE_GROWTH").unwrap_or_default(),
            partner: std::env::var("STRIPE_PRICE_PARTNER").unwrap_or_default(),
            core: std::env::var("STRIPE_PRICE_CORE").unwrap_or_default(),
        };

        let checkout_success_url = std::env::var("CHECKOUT_SUCCESS_URL")
            .unwrap_or_else(|_| "https://ridgelineconsulting.com/thanks".to_string());
        let checkout_cancel_url = std::env::var("CHECKOUT_CANCEL_URL")
            .unwrap_or_else(|_| "https://ridgelineconsulting.com/pricing".to_string());

        let dedupe_events = std::env::var("WEBHOOK_DEDUPE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            secret_key,
            webhook_secret,
            price_ids,
            checkout_success_url,
            checkout_cancel_url,
            dedupe_events,
        })
    }
}

fn require_env(name: &str) -> BillingResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BillingError::Configuration(format!("{} not set", name)))
}

/// Wrapper around the Stripe SDK client carrying our configuration.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self { client, config }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// The underlying SDK client, for direct Stripe API calls.
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_map_covers_subscription_offerings() {
        let prices = PriceIds {
            lite: "price_lite_1".into(),
            growth: "price_growth_1".into(),
            partner: "price_partner_1".into(),
            core: "price_core_1".into(),
        };

        let map = prices.tier_map();
        assert_eq!(map.get("price_lite_1").map(String::as_str), Some("lite"));
        assert_eq!(map.get("price_growth_1").map(String::as_str), Some("growth"));
        assert_eq!(
            map.get("price_partner_1").map(String::as_str),
            Some("partner")
        );
        // The one-time package is not a subscription tier
        assert!(!map.contains_key("price_core_1"));
    }
}
