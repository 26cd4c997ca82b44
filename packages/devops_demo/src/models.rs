use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::stopwatch::round2;

pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Per-field validation messages, keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// === Call log ===

/// The operation a call-log entry was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    #[serde(rename = "docker_repos")]
    RegistryRepos,
    #[serde(rename = "docker_tags")]
    RegistryTags,
    #[serde(rename = "ai_chat")]
    Chat,
    #[serde(rename = "health")]
    Health,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::RegistryRepos,
        Endpoint::RegistryTags,
        Endpoint::Chat,
        Endpoint::Health,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryRepos => "docker_repos",
            Self::RegistryTags => "docker_tags",
            Self::Chat => "ai_chat",
            Self::Health => "health",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown endpoint: {s}"))
    }
}

/// A 2xx status code.
pub fn is_success_status(status_code: Option<i64>) -> bool {
    matches!(status_code, Some(code) if (200..300).contains(&code))
}

/// One persisted record of an API invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallLogEntry {
    pub id: i64,
    pub endpoint: Endpoint,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: Option<f64>,
    pub status_code: Option<i64>,
    pub error_message: String,
    pub request_params: Option<serde_json::Value>,
}

impl CallLogEntry {
    pub fn was_successful(&self) -> bool {
        is_success_status(self.status_code)
    }
}

impl fmt::Display for CallLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}",
            self.endpoint,
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl Serialize for CallLogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CallLogEntry", 8)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("endpoint", &self.endpoint)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("response_time_ms", &self.response_time_ms)?;
        s.serialize_field("status_code", &self.status_code)?;
        s.serialize_field("was_successful", &self.was_successful())?;
        s.serialize_field("error_message", &self.error_message)?;
        s.serialize_field("request_params", &self.request_params)?;
        s.end()
    }
}

/// Aggregate view over every stored call-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogStats {
    pub total_calls: i64,
    pub successful_calls: i64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
}

impl CallLogStats {
    /// `average_response_time_ms` is the mean over non-null timings, or None
    /// when no entry has one.
    pub fn from_counts(
        total_calls: i64,
        successful_calls: i64,
        average_response_time_ms: Option<f64>,
    ) -> Self {
        let success_rate = if total_calls > 0 {
            successful_calls as f64 / total_calls as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_calls,
            successful_calls,
            success_rate,
            average_response_time_ms: round2(average_response_time_ms.unwrap_or(0.0)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

// === Registry ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub star_count: i64,
    #[serde(default)]
    pub pull_count: i64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    #[serde(default)]
    pub full_size: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updater_username: Option<String>,
}

// === Chat ===

/// A validated chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    pub stream: bool,
}

impl ChatRequest {
    /// Parse and validate a raw JSON body. Whitespace around `message` is
    /// trimmed before the blank and length checks.
    pub fn parse(body: &[u8], default_model: &str) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                errors.insert(
                    "non_field_errors".into(),
                    vec![format!("JSON parse error - {e}")],
                );
                return Err(errors);
            }
        };
        let Some(obj) = value.as_object() else {
            errors.insert(
                "non_field_errors".into(),
                vec!["Invalid data. Expected a dictionary.".into()],
            );
            return Err(errors);
        };

        let message = match obj.get("message") {
            None | Some(serde_json::Value::Null) => {
                push_error(&mut errors, "message", "This field is required.");
                None
            }
            Some(serde_json::Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    push_error(&mut errors, "message", "This field may not be blank.");
                    None
                } else if trimmed.chars().count() > MAX_MESSAGE_CHARS {
                    push_error(
                        &mut errors,
                        "message",
                        &format!("Ensure this field has no more than {MAX_MESSAGE_CHARS} characters."),
                    );
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Some(_) => {
                push_error(&mut errors, "message", "Not a valid string.");
                None
            }
        };

        let model = match obj.get("model") {
            None | Some(serde_json::Value::Null) => Some(default_model.to_string()),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                Some(s.trim().to_string())
            }
            Some(serde_json::Value::String(_)) => {
                push_error(&mut errors, "model", "This field may not be blank.");
                None
            }
            Some(_) => {
                push_error(&mut errors, "model", "Not a valid string.");
                None
            }
        };

        let stream = match obj.get("stream") {
            None | Some(serde_json::Value::Null) => Some(false),
            Some(serde_json::Value::Bool(b)) => Some(*b),
            Some(_) => {
                push_error(&mut errors, "stream", "Must be a valid boolean.");
                None
            }
        };

        match (message, model, stream) {
            (Some(message), Some(model), Some(stream)) if errors.is_empty() => Ok(Self {
                message,
                model,
                stream,
            }),
            _ => Err(errors),
        }
    }
}

fn push_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub response_time_ms: f64,
}

// === Health ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub database: String,
    pub deepseek_configured: bool,
    pub dockerhub_configured: bool,
}

#[cfg(test)]
mod model_tests {
    use super::*;

    // ── Endpoint ────────────────────────────────────────────────────────

    #[test]
    fn test_endpoint_round_trips_through_str() {
        for endpoint in Endpoint::ALL {
            assert_eq!(endpoint.as_str().parse::<Endpoint>().unwrap(), endpoint);
        }
        assert!("docker".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_serializes_as_tag() {
        let json = serde_json::to_string(&Endpoint::Chat).unwrap();
        assert_eq!(json, r#""ai_chat""#);
    }

    // ── CallLogEntry ────────────────────────────────────────────────────

    fn entry(status_code: Option<i64>) -> CallLogEntry {
        CallLogEntry {
            id: 1,
            endpoint: Endpoint::Health,
            timestamp: Utc::now(),
            response_time_ms: Some(100.5),
            status_code,
            error_message: String::new(),
            request_params: None,
        }
    }

    #[test]
    fn test_was_successful() {
        assert!(entry(Some(200)).was_successful());
        assert!(entry(Some(299)).was_successful());
        assert!(!entry(Some(300)).was_successful());
        assert!(!entry(Some(500)).was_successful());
        assert!(!entry(Some(199)).was_successful());
        assert!(!entry(None).was_successful());
    }

    #[test]
    fn test_entry_serializes_derived_flag() {
        let json = serde_json::to_value(entry(Some(201))).unwrap();
        assert_eq!(json["was_successful"], true);
        assert_eq!(json["endpoint"], "health");
        assert_eq!(json["response_time_ms"], 100.5);
        assert!(json["request_params"].is_null());
    }

    #[test]
    fn test_entry_display_names_endpoint() {
        assert!(entry(Some(200)).to_string().starts_with("health at "));
    }

    // ── CallLogStats ────────────────────────────────────────────────────

    #[test]
    fn test_stats_empty() {
        let stats = CallLogStats::from_counts(0, 0, None);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_response_time_ms, 0.0);
    }

    #[test]
    fn test_stats_rate_and_average() {
        let stats = CallLogStats::from_counts(4, 3, Some(123.456));
        assert_eq!(stats.success_rate, 75.0);
        assert_eq!(stats.average_response_time_ms, 123.46);
    }

    // ── ChatRequest ─────────────────────────────────────────────────────

    #[test]
    fn test_chat_request_defaults() {
        let req = ChatRequest::parse(br#"{"message":"  hello  "}"#, DEFAULT_CHAT_MODEL).unwrap();
        assert_eq!(req.message, "hello");
        assert_eq!(req.model, "deepseek-chat");
        assert!(!req.stream);
    }

    #[test]
    fn test_chat_request_explicit_fields() {
        let req = ChatRequest::parse(
            br#"{"message":"hi","model":"deepseek-reasoner","stream":true}"#,
            DEFAULT_CHAT_MODEL,
        )
        .unwrap();
        assert_eq!(req.model, "deepseek-reasoner");
        assert!(req.stream);
    }

    #[test]
    fn test_chat_request_missing_message() {
        let errors = ChatRequest::parse(br#"{"model":"x"}"#, DEFAULT_CHAT_MODEL).unwrap_err();
        assert_eq!(errors["message"], vec!["This field is required."]);
    }

    #[test]
    fn test_chat_request_blank_message() {
        let errors = ChatRequest::parse(br#"{"message":"   "}"#, DEFAULT_CHAT_MODEL).unwrap_err();
        assert_eq!(errors["message"], vec!["This field may not be blank."]);
    }

    #[test]
    fn test_chat_request_length_limit_counts_chars() {
        let at_limit = "é".repeat(MAX_MESSAGE_CHARS);
        let body = serde_json::to_vec(&serde_json::json!({ "message": at_limit })).unwrap();
        assert!(ChatRequest::parse(&body, DEFAULT_CHAT_MODEL).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let body = serde_json::to_vec(&serde_json::json!({ "message": over })).unwrap();
        let errors = ChatRequest::parse(&body, DEFAULT_CHAT_MODEL).unwrap_err();
        assert!(errors["message"][0].contains("2000"));
    }

    #[test]
    fn test_chat_request_wrong_types() {
        let errors = ChatRequest::parse(
            br#"{"message":42,"model":false,"stream":"yes"}"#,
            DEFAULT_CHAT_MODEL,
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["stream"], vec!["Must be a valid boolean."]);
    }

    #[test]
    fn test_chat_request_malformed_json() {
        let errors = ChatRequest::parse(b"{not json", DEFAULT_CHAT_MODEL).unwrap_err();
        assert!(errors.contains_key("non_field_errors"));

        let errors = ChatRequest::parse(b"[1,2]", DEFAULT_CHAT_MODEL).unwrap_err();
        assert!(errors.contains_key("non_field_errors"));
    }

    // ── Registry records ────────────────────────────────────────────────

    #[test]
    fn test_repository_record_defaults() {
        let rec: RepositoryRecord = serde_json::from_str(r#"{"name":"web"}"#).unwrap();
        assert_eq!(rec.name, "web");
        assert_eq!(rec.star_count, 0);
        assert_eq!(rec.pull_count, 0);
        assert!(!rec.is_private);
        assert!(rec.description.is_none());
        assert!(rec.last_updated.is_none());
    }

    #[test]
    fn test_tag_record_parses_hub_item() {
        let rec: TagRecord = serde_json::from_str(
            r#"{"name":"latest","full_size":1024,"last_updated":"2025-01-01T00:00:00.123456Z","last_updater_username":"bob","digest":"sha256:abc"}"#,
        )
        .unwrap();
        assert_eq!(rec.full_size, Some(1024));
        assert_eq!(rec.last_updater_username.as_deref(), Some("bob"));
        assert!(rec.last_updated.is_some());
    }
}
