//! Health probe

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// How long the database ping may take before the probe reports degraded.
const DB_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = matches!(
        tokio::time::timeout(
            DB_PROBE_TIMEOUT,
            sqlx::query("SELECT 1").execute(&state.pool)
        )
        .await,
        Ok(Ok(_))
    );

    if db_ok {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "connected" })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "unreachable" })),
        )
    }
}
