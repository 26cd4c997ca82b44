pub mod chat;
pub mod health;
pub mod logs;
pub mod registry;

// Re-export all handlers for easy route registration
pub use chat::chat_handler;
pub use health::health_handler;
pub use logs::{call_log_stats_handler, get_call_log_handler, list_call_logs_handler};
pub use registry::{list_repositories_handler, list_tags_handler};

use serde_json::Value;
use tracing::error;

use crate::AppState;
use crate::error::ApiError;
use crate::repository::{CallOutcome, PendingCallLog};

/// Persist a call log. A write failure is reported and otherwise ignored:
/// the caller's response does not depend on it.
pub(crate) async fn record_call(state: &AppState, pending: PendingCallLog, outcome: CallOutcome) {
    let endpoint = pending.endpoint();
    if let Err(e) = state.call_logs.finalize(pending, outcome).await {
        error!("Failed to persist {} call log: {:#}", endpoint, e);
    }
}

/// Finalize `pending` from a handler's result, then hand the result back.
/// Successful calls are stored with status 200 and their request parameters;
/// failures with the status and message of the error.
pub(crate) async fn finish<T>(
    state: &AppState,
    pending: PendingCallLog,
    response_time_ms: f64,
    result: Result<(T, Value), ApiError>,
) -> Result<T, ApiError> {
    match result {
        Ok((value, params)) => {
            record_call(
                state,
                pending,
                CallOutcome::success(response_time_ms).with_params(params),
            )
            .await;
            Ok(value)
        }
        Err(err) => {
            let outcome = CallOutcome::failure(
                i64::from(err.status().as_u16()),
                response_time_ms,
                err.log_message(),
            );
            record_call(state, pending, outcome).await;
            Err(err)
        }
    }
}
