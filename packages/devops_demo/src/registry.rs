//! Paginated client for the container-registry catalog API.
//!
//! Listing endpoints answer with `{"results": [...], "next": <url|null>}`;
//! every call follows `next` until it is absent and returns the items of all
//! pages in page order.

use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::RegistrySettings;
use crate::models::{RepositoryRecord, TagRecord};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry username is required")]
    MissingUsername,

    #[error("invalid repository name: {0:?}")]
    InvalidRepositoryName(String),

    #[error("invalid registry base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to fetch {what}: {status}: {body}")]
    Status {
        what: String,
        status: StatusCode,
        body: String,
    },

    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected registry response for {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A repository name must be one whole path segment of its own.
pub fn is_valid_repo_name(name: &str) -> bool {
    !matches!(name, "" | "." | "..")
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(settings: &RegistrySettings) -> Result<Self, RegistryError> {
        let username = settings
            .username
            .clone()
            .ok_or(RegistryError::MissingUsername)?;

        let invalid = |reason: String| RegistryError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason,
        };
        let base_url = Url::parse(&settings.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            username,
            token: settings.token.clone(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `{base}/{segments...}?page_size=N`. Each segment is percent-encoded
    /// on its own, so a name cannot add path levels or query parameters.
    fn endpoint_url(&self, segments: &[&str], page_size: u32) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("page_size", &page_size.to_string());
        url.into()
    }

    fn repositories_url(&self, page_size: u32) -> String {
        // Trailing empty segment keeps the upstream's `/repositories/{user}/` form
        self.endpoint_url(&["repositories", &self.username, ""], page_size)
    }

    fn tags_url(&self, repo_name: &str, page_size: u32) -> Result<String, RegistryError> {
        if !is_valid_repo_name(repo_name) {
            return Err(RegistryError::InvalidRepositoryName(repo_name.to_string()));
        }
        Ok(self.endpoint_url(
            &["repositories", &self.username, repo_name, "tags"],
            page_size,
        ))
    }

    /// Names of every repository owned by the configured account.
    pub async fn list_repositories(&self, page_size: u32) -> Result<Vec<String>, RegistryError> {
        info!("📦 Fetching repositories for {}...", self.username);
        let repos: Vec<Named> = self
            .fetch_all(self.repositories_url(page_size), "repositories")
            .await?;
        info!("✅ Found {} repositories.", repos.len());
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    /// Full repository items across all pages.
    pub async fn list_repository_records(
        &self,
        page_size: u32,
    ) -> Result<Vec<RepositoryRecord>, RegistryError> {
        info!("📦 Fetching repositories for {}...", self.username);
        let repos: Vec<RepositoryRecord> = self
            .fetch_all(self.repositories_url(page_size), "repositories")
            .await?;
        info!("✅ Found {} repositories.", repos.len());
        Ok(repos)
    }

    /// Names of every tag in `repo_name`.
    pub async fn list_tags(
        &self,
        repo_name: &str,
        page_size: u32,
    ) -> Result<Vec<String>, RegistryError> {
        info!("🏷️ Fetching tags for repository: {}", repo_name);
        let tags: Vec<Named> = self
            .fetch_all(
                self.tags_url(repo_name, page_size)?,
                &format!("tags for {repo_name}"),
            )
            .await?;
        info!("✅ Found {} tags in {}.", tags.len(), repo_name);
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    /// Full tag items across all pages.
    pub async fn list_tag_records(
        &self,
        repo_name: &str,
        page_size: u32,
    ) -> Result<Vec<TagRecord>, RegistryError> {
        info!("🏷️ Fetching tags for repository: {}", repo_name);
        let tags: Vec<TagRecord> = self
            .fetch_all(
                self.tags_url(repo_name, page_size)?,
                &format!("tags for {repo_name}"),
            )
            .await?;
        info!("✅ Found {} tags in {}.", tags.len(), repo_name);
        Ok(tags)
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        first_url: String,
        what: &str,
    ) -> Result<Vec<T>, RegistryError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        let mut pages = 0usize;

        while let Some(url) = next {
            let mut request = self.http.get(&url);
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("JWT {token}"));
            }

            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;

            if status != StatusCode::OK {
                return Err(RegistryError::Status {
                    what: what.to_string(),
                    status,
                    body,
                });
            }

            let page: Page<T> =
                serde_json::from_str(&body).map_err(|source| RegistryError::Decode {
                    what: what.to_string(),
                    source,
                })?;

            pages += 1;
            debug!("Fetched page {} of {} ({} items)", pages, what, page.results.len());

            items.extend(page.results);
            next = page.next.filter(|n| !n.is_empty());
        }

        Ok(items)
    }
}
