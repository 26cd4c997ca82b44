use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::models::{CallLogEntry, CallLogStats, FieldErrors, PaginatedResponse};

const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListCallLogsQuery {
    page: Option<String>,
    per_page: Option<String>,
}

/// Parses each present field as an integer, collecting one message per bad field.
fn parse_list_query(query: &ListCallLogsQuery) -> Result<(i64, i64), FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut field = |name: &str, raw: Option<&str>, default: i64| match raw {
        None => default,
        Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
            errors.insert(
                name.to_string(),
                vec!["A valid integer is required.".to_string()],
            );
            default
        }),
    };
    let page = field("page", query.page.as_deref(), 1);
    let per_page = field("per_page", query.per_page.as_deref(), DEFAULT_PER_PAGE);

    if errors.is_empty() {
        Ok((page.max(1), per_page.clamp(1, MAX_PER_PAGE)))
    } else {
        Err(errors)
    }
}

pub async fn list_call_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListCallLogsQuery>,
) -> Result<Json<PaginatedResponse<CallLogEntry>>, ApiError> {
    let (page, per_page) = parse_list_query(&query).map_err(ApiError::Validation)?;
    Ok(Json(state.call_logs.list_call_logs(page, per_page).await?))
}

pub async fn get_call_log_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CallLogEntry>, ApiError> {
    // A non-numeric id names no entry
    let Ok(id) = id.parse::<i64>() else {
        return Err(ApiError::NotFound);
    };
    state
        .call_logs
        .get_call_log(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn call_log_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<CallLogStats>, ApiError> {
    Ok(Json(state.call_logs.call_log_stats().await?))
}
