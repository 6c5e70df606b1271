//! API error handling
//!
//! External callers get intentionally generic messages; the detail lives in
//! tracing output and, for webhook events, in the event-log row.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ridgeline_billing::BillingError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Field-level validation failures, returned as a field -> message map.
    #[error("Validation failed")]
    Validation(HashMap<String, String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    /// A required secret/endpoint is absent; the operation fails closed.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": "Validation failed",
                    "details": details,
                }),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::NotConfigured(what) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("{} not configured", what) }),
            ),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid signature".to_string())
            }
            BillingError::InvalidInput(message) => ApiError::BadRequest(message),
            BillingError::NotFound(message) => ApiError::NotFound(message),
            BillingError::EmailNotConfigured => ApiError::NotConfigured("Email service"),
            BillingError::Configuration(message) => {
                tracing::error!(error = %message, "Missing configuration");
                ApiError::NotConfigured("Payment service")
            }
            other => {
                tracing::error!(error = %other, "Billing operation failed");
                ApiError::Internal(anyhow::anyhow!(other))
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "Database error");
        ApiError::Internal(anyhow::anyhow!(e))
    }
}
