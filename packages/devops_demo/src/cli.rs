//! One-shot commands that run without the HTTP server.

use anyhow::{Context, Result};

use crate::config::{AppConfig, FileConfig, RegistrySettings};
use crate::db::Database;
use crate::registry::RegistryClient;
use crate::repository::CallLogRepository;
use crate::stopwatch::{Stopwatch, duration_ms};

/// Print the call-log aggregate as JSON, followed by the most recent entry.
pub async fn stats_command(config: &AppConfig) -> Result<()> {
    let db = Database::new(config).await?;
    let call_logs = CallLogRepository::new(db.pool.clone());

    let stats = call_logs.call_log_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let latest = call_logs.list_call_logs(1, 1).await?;
    if let Some(entry) = latest.items.first() {
        println!("Latest call: {entry}");
    }
    Ok(())
}

fn registry_client(file_config: &FileConfig) -> Result<(RegistryClient, RegistrySettings)> {
    let settings = RegistrySettings::from_file(&file_config.registry);
    let client = RegistryClient::new(&settings)
        .context("Set DOCKERHUB_USERNAME or [registry] username in config.toml")?;
    Ok((client, settings))
}

/// Print every repository name of the configured account.
pub async fn repos_command(file_config: &FileConfig, page_size: Option<u32>) -> Result<()> {
    let (client, settings) = registry_client(file_config)?;
    let mut stopwatch = Stopwatch::new();

    let names = client
        .list_repositories(page_size.unwrap_or(settings.default_page_size))
        .await?;
    stopwatch.elapsed();

    for name in &names {
        println!("{name}");
    }
    eprintln!(
        "{} repositories for {} ({} ms)",
        names.len(),
        client.username(),
        duration_ms(stopwatch.total_elapsed())
    );
    Ok(())
}

/// Print every tag name of one repository.
pub async fn tags_command(
    file_config: &FileConfig,
    repo_name: &str,
    page_size: Option<u32>,
) -> Result<()> {
    let (client, settings) = registry_client(file_config)?;
    let mut stopwatch = Stopwatch::new();

    let names = client
        .list_tags(repo_name, page_size.unwrap_or(settings.tag_page_size))
        .await?;
    stopwatch.elapsed();

    for name in &names {
        println!("{name}");
    }
    eprintln!(
        "{} tags for {}/{} ({} ms)",
        names.len(),
        client.username(),
        repo_name,
        duration_ms(stopwatch.total_elapsed())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Endpoint;
    use crate::repository::CallOutcome;
    use crate::test_helpers::spawn_upstream;
    use axum::{Json, Router, routing::get};
    use serde_json::json;

    fn file_config(base_url: &str) -> FileConfig {
        let mut fc = FileConfig::default();
        fc.registry.username = Some("demo".into());
        fc.registry.base_url = base_url.to_string();
        fc
    }

    #[tokio::test]
    async fn stats_command_reads_existing_database() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        {
            let db = Database::new(&config).await.unwrap();
            let call_logs = CallLogRepository::new(db.pool.clone());
            let pending = call_logs.create(Endpoint::Health);
            call_logs
                .finalize(pending, CallOutcome::success(1.0))
                .await
                .unwrap();
            db.pool.close().await;
        }

        stats_command(&config).await.unwrap();
    }

    #[tokio::test]
    async fn repos_command_requires_username() {
        let err = repos_command(&FileConfig::default(), None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("username"));
    }

    #[tokio::test]
    async fn repos_and_tags_commands_list_names() {
        let app = Router::new()
            .route(
                "/repositories/demo/",
                get(|| async { Json(json!({ "results": [{ "name": "web" }], "next": null })) }),
            )
            .route(
                "/repositories/demo/web/tags",
                get(|| async { Json(json!({ "results": [{ "name": "latest" }], "next": null })) }),
            );
        let base = spawn_upstream(app).await;
        let fc = file_config(&base);

        repos_command(&fc, Some(5)).await.unwrap();
        tags_command(&fc, "web", None).await.unwrap();
    }

    #[tokio::test]
    async fn tags_command_surfaces_upstream_failure() {
        let app = Router::new();
        let base = spawn_upstream(app).await;
        let err = tags_command(&file_config(&base), "nope", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
