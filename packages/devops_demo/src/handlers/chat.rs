use axum::{Json, body::Bytes, extract::State};
use serde_json::json;
use tracing::error;

use crate::AppState;
use crate::chat::CHAT_ERROR_PREFIX;
use crate::error::{ApiError, CHAT_NOT_CONFIGURED};
use crate::handlers::finish;
use crate::models::{ChatRequest, ChatResponse, Endpoint};
use crate::stopwatch::Stopwatch;

/// Send one message to the chat model. A streamed reply is drained before
/// the response is built.
pub async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut stopwatch = Stopwatch::new();
    let pending = state.call_logs.create(Endpoint::Chat);

    let result = async {
        let client = state
            .chat
            .as_deref()
            .ok_or(ApiError::Configuration(CHAT_NOT_CONFIGURED))?;
        let request = ChatRequest::parse(&body, &state.chat_settings.default_model)
            .map_err(ApiError::Validation)?;

        let text = client
            .send(&request.message, &request.model, request.stream)
            .await
            .into_text()
            .await
            .map_err(|e| {
                error!("Chat stream failed: {}", e);
                ApiError::Upstream(format!("{CHAT_ERROR_PREFIX}: {e}"))
            })?;

        let params = json!({
            "message_length": request.message.chars().count(),
            "model": request.model,
            "stream": request.stream,
        });
        Ok::<_, ApiError>(((text, request.model), params))
    }
    .await;

    let response_time_ms = stopwatch.elapsed_ms();
    let (response, model) = finish(&state, pending, response_time_ms, result).await?;

    Ok(Json(ChatResponse {
        response,
        model,
        response_time_ms,
    }))
}
