use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::AppState;
use crate::error::{ApiError, REGISTRY_NOT_CONFIGURED};
use crate::handlers::finish;
use crate::models::{Endpoint, FieldErrors, RepositoryRecord, TagRecord};
use crate::registry::{RegistryClient, is_valid_repo_name};
use crate::stopwatch::Stopwatch;

#[derive(Debug, Deserialize)]
pub struct PageSizeQuery {
    page_size: Option<String>,
}

fn parse_page_size(raw: Option<&str>, default: u32) -> Result<u32, FieldErrors> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let message = match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => return u32::try_from(n).map_err(|_| too_large()),
        Ok(_) => "Ensure this value is greater than or equal to 1.",
        Err(_) => "A valid integer is required.",
    };
    Err(FieldErrors::from([(
        "page_size".to_string(),
        vec![message.to_string()],
    )]))
}

fn too_large() -> FieldErrors {
    FieldErrors::from([(
        "page_size".to_string(),
        vec!["Ensure this value is less than or equal to 4294967295.".to_string()],
    )])
}

fn registry_client(state: &AppState) -> Result<&RegistryClient, ApiError> {
    state
        .registry
        .as_deref()
        .ok_or(ApiError::Configuration(REGISTRY_NOT_CONFIGURED))
}

/// List the configured account's repositories, following every page.
pub async fn list_repositories_handler(
    State(state): State<AppState>,
    Query(query): Query<PageSizeQuery>,
) -> Result<Json<Vec<RepositoryRecord>>, ApiError> {
    let mut stopwatch = Stopwatch::new();
    let pending = state.call_logs.create(Endpoint::RegistryRepos);

    let result = async {
        let client = registry_client(&state)?;
        let page_size = parse_page_size(
            query.page_size.as_deref(),
            state.registry_settings.default_page_size,
        )
        .map_err(ApiError::Validation)?;

        let repos = client
            .list_repository_records(page_size)
            .await
            .map_err(|e| {
                error!("Error fetching registry repositories: {}", e);
                ApiError::Upstream(e.to_string())
            })?;
        Ok::<_, ApiError>((repos, json!({ "page_size": page_size })))
    }
    .await;

    finish(&state, pending, stopwatch.elapsed_ms(), result)
        .await
        .map(Json)
}

/// List the tags of one repository.
pub async fn list_tags_handler(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
    Query(query): Query<PageSizeQuery>,
) -> Result<Json<Vec<TagRecord>>, ApiError> {
    let mut stopwatch = Stopwatch::new();
    let pending = state.call_logs.create(Endpoint::RegistryTags);

    let result = async {
        let client = registry_client(&state)?;
        if !is_valid_repo_name(&repo_name) {
            return Err(ApiError::Validation(FieldErrors::from([(
                "repo_name".to_string(),
                vec!["Not a valid repository name.".to_string()],
            )])));
        }
        let page_size = parse_page_size(
            query.page_size.as_deref(),
            state.registry_settings.tag_page_size,
        )
        .map_err(ApiError::Validation)?;

        let tags = client
            .list_tag_records(&repo_name, page_size)
            .await
            .map_err(|e| {
                error!("Error fetching tags for repo {}: {}", repo_name, e);
                ApiError::Upstream(e.to_string())
            })?;
        Ok::<_, ApiError>((
            tags,
            json!({ "repo_name": repo_name, "page_size": page_size }),
        ))
    }
    .await;

    finish(&state, pending, stopwatch.elapsed_ms(), result)
        .await
        .map(Json)
}
