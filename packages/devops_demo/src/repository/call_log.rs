use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::models::{CallLogEntry, CallLogStats, Endpoint, PaginatedResponse};

use super::CallLogRepository;

/// An in-progress call-log entry. Nothing is written until it is handed to
/// [`CallLogRepository::finalize`], which consumes it.
#[derive(Debug)]
#[must_use = "a pending call log must be finalized"]
pub struct PendingCallLog {
    endpoint: Endpoint,
    timestamp: DateTime<Utc>,
}

impl PendingCallLog {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    #[cfg(test)]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// The fields attached to an entry when its outcome is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOutcome {
    pub status_code: Option<i64>,
    pub response_time_ms: Option<f64>,
    pub error_message: String,
    pub request_params: Option<serde_json::Value>,
}

impl CallOutcome {
    pub fn success(response_time_ms: f64) -> Self {
        Self {
            status_code: Some(200),
            response_time_ms: Some(response_time_ms),
            ..Default::default()
        }
    }

    pub fn failure(status_code: i64, response_time_ms: f64, error: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            error_message: error.into(),
            request_params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.request_params = Some(params);
        self
    }
}

/// Fixed-width UTC so that text ordering matches time ordering.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_entry(row: &SqliteRow) -> Result<CallLogEntry> {
    let endpoint: String = row.try_get("endpoint")?;
    let timestamp: String = row.try_get("timestamp")?;
    let request_params: Option<String> = row.try_get("request_params")?;

    Ok(CallLogEntry {
        id: row.try_get("id")?,
        endpoint: endpoint.parse::<Endpoint>().map_err(anyhow::Error::msg)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .with_context(|| format!("Invalid call log timestamp: {timestamp}"))?
            .with_timezone(&Utc),
        response_time_ms: row.try_get("response_time_ms")?,
        status_code: row.try_get("status_code")?,
        error_message: row.try_get("error_message")?,
        request_params: request_params
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("Invalid call log request_params")?,
    })
}

impl CallLogRepository {
    /// Start an entry for `endpoint`. The timestamp is fixed here, at the
    /// precision it is stored with.
    pub fn create(&self, endpoint: Endpoint) -> PendingCallLog {
        PendingCallLog {
            endpoint,
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }

    /// Attach the outcome and persist the entry.
    pub async fn finalize(
        &self,
        pending: PendingCallLog,
        outcome: CallOutcome,
    ) -> Result<CallLogEntry> {
        let params_json = outcome
            .request_params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO api_call_logs (endpoint, timestamp, response_time_ms, status_code, error_message, request_params)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pending.endpoint.as_str())
        .bind(encode_timestamp(&pending.timestamp))
        .bind(outcome.response_time_ms)
        .bind(outcome.status_code)
        .bind(&outcome.error_message)
        .bind(&params_json)
        .execute(&self.pool)
        .await
        .context("Failed to insert call log")?;

        let id = result.last_insert_rowid();
        debug!(
            "Logged {} call {} (status {:?})",
            pending.endpoint, id, outcome.status_code
        );

        Ok(CallLogEntry {
            id,
            endpoint: pending.endpoint,
            timestamp: pending.timestamp,
            response_time_ms: outcome.response_time_ms,
            status_code: outcome.status_code,
            error_message: outcome.error_message,
            request_params: outcome.request_params,
        })
    }

    /// Newest-first page of entries. Pages past the end come back empty.
    pub async fn list_call_logs(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<PaginatedResponse<CallLogEntry>> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_call_logs")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, endpoint, timestamp, response_time_ms, status_code, error_message, request_params
            FROM api_call_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_entry).collect::<Result<Vec<_>>>()?;

        let total_pages = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };

        Ok(PaginatedResponse {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    pub async fn get_call_log(&self, id: i64) -> Result<Option<CallLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, endpoint, timestamp, response_time_ms, status_code, error_message, request_params
            FROM api_call_logs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    pub async fn call_log_stats(&self) -> Result<CallLogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_calls,
                COALESCE(SUM(CASE WHEN status_code >= 200 AND status_code < 300 THEN 1 ELSE 0 END), 0) AS successful_calls,
                AVG(response_time_ms) AS avg_response_time
            FROM api_call_logs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to aggregate call logs")?;

        Ok(CallLogStats::from_counts(
            row.try_get("total_calls")?,
            row.try_get("successful_calls")?,
            row.try_get("avg_response_time")?,
        ))
    }
}
