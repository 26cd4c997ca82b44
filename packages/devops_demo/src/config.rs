use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::models::DEFAULT_CHAT_MODEL;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Equivalent ways to configure:
//
//   config.toml:     [registry]
//                    username = "acme"
//
//   env var:         DEVOPS_REGISTRY__USERNAME=acme   (double underscore = nesting)
//
//   legacy env var:  DOCKERHUB_USERNAME=acme
//                    (also DOCKERHUB_TOKEN and DEEPSEEK_API_KEY)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub registry: RegistryFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Container registry credentials and tunables (lives under `[registry]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryFileConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_registry_url")]
    pub base_url: String,
    #[serde(default = "default_repo_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_tag_page_size")]
    pub tag_page_size: u32,
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryFileConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            base_url: default_registry_url(),
            default_page_size: default_repo_page_size(),
            tag_page_size: default_tag_page_size(),
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

/// Chat-completion service settings (lives under `[chat]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_chat_url(),
            default_model: default_chat_model(),
            temperature: default_temperature(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_registry_url() -> String {
    "https://hub.docker.com/v2".to_string()
}
fn default_repo_page_size() -> u32 {
    10
}
fn default_tag_page_size() -> u32 {
    100
}
fn default_registry_timeout_secs() -> u64 {
    30
}
fn default_chat_url() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_chat_timeout_secs() -> u64 {
    120
}

/// Environment variable names used by earlier deployments, mapped onto
/// their nested config keys.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("DOCKERHUB_USERNAME", "registry.username"),
    ("DOCKERHUB_TOKEN", "registry.token"),
    ("DEEPSEEK_API_KEY", "chat.api_key"),
];

/// Build a figment that layers: defaults → config.toml → DEVOPS_* env vars → legacy env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `DEVOPS_SERVER__PORT=9000`  →  `server.port = 9000`
///   `DEVOPS_CHAT__API_KEY=sk-…`  →  `chat.api_key = "sk-…"`
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
        value::Uncased,
    };

    let legacy_names: Vec<&'static str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("DEVOPS_").split("__"))
        .merge(Env::raw().only(&legacy_names).map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key == *name)
                .map(|(_, nested)| Uncased::from(*nested))
                .unwrap_or_else(|| Uncased::from_borrowed(key.as_str()))
        }))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Registry client configuration (runtime view).
#[derive(Clone, Debug)]
pub struct RegistrySettings {
    pub username: Option<String>,
    pub token: Option<String>,
    pub base_url: String,
    pub default_page_size: u32,
    pub tag_page_size: u32,
    pub timeout: Duration,
}

impl RegistrySettings {
    pub fn from_file(fc: &RegistryFileConfig) -> Self {
        Self {
            username: non_empty(&fc.username),
            token: non_empty(&fc.token),
            base_url: fc.base_url.trim_end_matches('/').to_string(),
            default_page_size: fc.default_page_size,
            tag_page_size: fc.tag_page_size,
            timeout: Duration::from_secs(fc.timeout_secs),
        }
    }

    /// Both credentials present.
    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.token.is_some()
    }
}

/// Chat client configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ChatSettings {
    pub fn from_file(fc: &ChatFileConfig) -> Self {
        Self {
            api_key: non_empty(&fc.api_key),
            base_url: fc.base_url.trim_end_matches('/').to_string(),
            default_model: fc.default_model.clone(),
            temperature: fc.temperature,
            timeout: Duration::from_secs(fc.timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// =============================================================================
// Directory layout config (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl AppConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".devops_demo"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let db_path = data_dir.join("devops_demo.db");

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir, db_path })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 8000);
        assert!(fc.registry.username.is_none());
        assert_eq!(fc.registry.base_url, "https://hub.docker.com/v2");
        assert_eq!(fc.registry.default_page_size, 10);
        assert_eq!(fc.registry.tag_page_size, 100);
        assert!(fc.chat.api_key.is_none());
        assert_eq!(fc.chat.default_model, "deepseek-chat");
        assert_eq!(fc.chat.temperature, 0.7);
    }

    // ── RegistrySettings ────────────────────────────────────────────────

    #[test]
    fn test_registry_needs_both_credentials() {
        let mut fc = RegistryFileConfig {
            username: Some("acme".into()),
            ..Default::default()
        };
        assert!(!RegistrySettings::from_file(&fc).is_configured());

        fc.token = Some("secret".into());
        let settings = RegistrySettings::from_file(&fc);
        assert!(settings.is_configured());
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_blank_credentials_count_as_unset() {
        let fc = RegistryFileConfig {
            username: Some("  ".into()),
            token: Some(String::new()),
            ..Default::default()
        };
        let settings = RegistrySettings::from_file(&fc);
        assert!(settings.username.is_none());
        assert!(settings.token.is_none());
        assert!(!settings.is_configured());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let fc = RegistryFileConfig {
            base_url: "http://localhost:1234/v2/".into(),
            ..Default::default()
        };
        assert_eq!(
            RegistrySettings::from_file(&fc).base_url,
            "http://localhost:1234/v2"
        );
    }

    // ── ChatSettings ────────────────────────────────────────────────────

    #[test]
    fn test_chat_settings() {
        let fc = ChatFileConfig {
            api_key: Some("sk-test".into()),
            timeout_secs: 5,
            ..Default::default()
        };
        let settings = ChatSettings::from_file(&fc);
        assert!(settings.is_configured());
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert!(!ChatSettings::from_file(&ChatFileConfig::default()).is_configured());
    }

    // ── AppConfig ───────────────────────────────────────────────────────

    #[test]
    fn test_app_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        let config = AppConfig::new(Some(nested.clone())).unwrap();

        assert!(nested.exists());
        assert_eq!(config.db_path, nested.join("devops_demo.db"));
        assert_eq!(config.config_toml_path(), nested.join("config.toml"));
    }

    #[test]
    fn test_db_url() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let url = config.db_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("devops_demo.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("config.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.server.port, 8000);
        assert_eq!(fc.chat.base_url, "https://api.deepseek.com");
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9090\n\n[registry]\nbase_url = \"http://localhost:5000/v2\"\ndefault_page_size = 25\n\n[chat]\ndefault_model = \"deepseek-reasoner\"\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.port, 9090);
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.registry.base_url, "http://localhost:5000/v2");
        assert_eq!(fc.registry.default_page_size, 25);
        assert_eq!(fc.registry.tag_page_size, 100);
        assert_eq!(fc.chat.default_model, "deepseek-reasoner");
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"not a port\"\n").unwrap();
        assert!(load_config(&path).extract::<FileConfig>().is_err());
    }
}
