use axum::{Json, extract::State};
use chrono::Utc;

use crate::AppState;
use crate::handlers::record_call;
use crate::models::{Endpoint, HealthStatus};
use crate::repository::CallOutcome;
use crate::stopwatch::Stopwatch;

/// Health check endpoint. Always answers 200; a failed database probe is
/// reported in the `database` field.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    let mut stopwatch = Stopwatch::new();
    let pending = state.call_logs.create(Endpoint::Health);

    let database = match state.db.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {e:#}"),
    };

    let status = HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        deepseek_configured: state.chat.is_some(),
        dockerhub_configured: state.registry.is_some(),
    };

    record_call(&state, pending, CallOutcome::success(stopwatch.elapsed_ms())).await;
    Json(status)
}
