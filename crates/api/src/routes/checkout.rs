//! Checkout and billing-portal endpoints

use axum::extract::State;
use axum::Json;
use ridgeline_billing::{CheckoutRequest, CheckoutResponse, PortalResponse};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub offering_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub test: bool,
}

/// POST /api/checkout
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing_service()?;

    if body.customer_email.trim().is_empty() {
        return Err(ApiError::BadRequest("customerEmail is required".to_string()));
    }

    let request = CheckoutRequest {
        offering_id: body.offering_id,
        customer_email: body.customer_email.trim().to_string(),
        customer_name: body.customer_name.trim().to_string(),
        promo_code: body.promo_code.filter(|c| !c.is_empty()),
        test: body.test,
    };

    let response = billing.checkout.create_session(&request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBody {
    pub customer_id: String,
    pub return_url: String,
}

/// POST /api/portal
pub async fn create_portal_session(
    State(state): State<AppState>,
    Json(body): Json<PortalBody>,
) -> ApiResult<Json<PortalResponse>> {
    let billing = state.billing_service()?;

    let response = billing
        .portal
        .create_session(&body.customer_id, &body.return_url)
        .await?;

    Ok(Json(response))
}
