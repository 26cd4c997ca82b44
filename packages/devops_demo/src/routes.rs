use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;
use crate::handlers;

pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        // System
        .route("/api/health", get(handlers::health_handler))
        // Registry
        .route("/api/docker/repos", get(handlers::list_repositories_handler))
        .route(
            "/api/docker/tags/{repo_name}",
            get(handlers::list_tags_handler),
        )
        // Chat
        .route("/api/ai/chat", post(handlers::chat_handler))
        // Call logs
        .route("/api/logs", get(handlers::list_call_logs_handler))
        .route("/api/logs/stats", get(handlers::call_log_stats_handler))
        .route("/api/logs/{id}", get(handlers::get_call_log_handler))
}
