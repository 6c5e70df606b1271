//! Stripe webhook endpoint
//!
//! The body must reach verification untouched: axum's `Bytes` extractor
//! hands over the raw payload, and nothing is parsed or persisted before the
//! signature checks out. Status codes are the retry contract with the
//! provider: 400 means "do not redeliver", 500 means "please redeliver".

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(billing) = state.billing_service() else {
        tracing::error!("Webhook received but payment service is not configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Payment service not configured",
        );
    };

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Webhook request without a Stripe-Signature header");
        return error_response(StatusCode::BAD_REQUEST, "Missing signature header");
    };

    let Ok(payload) = std::str::from_utf8(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    // An unverified payload is never trusted enough to log; only the
    // verification failure itself reaches operational logs.
    let event = match billing.webhooks.verify_event(payload, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            return error_response(StatusCode::BAD_REQUEST, "Invalid signature");
        }
    };

    let event_id = event.id.clone();
    let event_type = event.event_type.clone();

    match billing.webhooks.handle_event(event).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e) => {
            tracing::error!(
                event_id = %event_id,
                event_type = %event_type,
                error = %e,
                "Webhook processing failed"
            );
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed",
            )
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
