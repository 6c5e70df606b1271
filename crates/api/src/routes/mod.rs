//! HTTP routes

pub mod admin;
pub mod checkout;
pub mod contact;
pub mod health;
pub mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/api/contact", post(contact::submit_contact))
        .route("/api/checkout", post(checkout::create_checkout_session))
        .route("/api/portal", post(checkout::create_portal_session))
        .route("/api/admin/analytics", get(admin::get_analytics))
        .route("/api/admin/webhooks", get(admin::list_webhook_events))
        .with_state(state)
}
