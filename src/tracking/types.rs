// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MLflow REST API types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Request metadata key MLflow uses for the Claude Code session id.
pub const SESSION_METADATA_KEY: &str = "mlflow.trace.session";

/// Request metadata key holding a preview of the trace inputs.
pub const INPUTS_METADATA_KEY: &str = "mlflow.traceInputs";

/// Request metadata key holding a preview of the trace outputs.
pub const OUTPUTS_METADATA_KEY: &str = "mlflow.traceOutputs";

/// An MLflow experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_stage: Option<String>,
}

/// A key/value pair as MLflow encodes tags and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Trace completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    Ok,
    Error,
    InProgress,
    #[serde(other)]
    TraceStatusUnspecified,
}

impl Default for TraceStatus {
    fn default() -> Self {
        Self::TraceStatusUnspecified
    }
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceStatus::Ok => write!(f, "OK"),
            TraceStatus::Error => write!(f, "ERROR"),
            TraceStatus::InProgress => write!(f, "IN_PROGRESS"),
            TraceStatus::TraceStatusUnspecified => write!(f, "UNSPECIFIED"),
        }
    }
}

/// Summary information about a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceInfo {
    pub request_id: String,
    #[serde(default)]
    pub experiment_id: String,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub timestamp_ms: Option<i64>,
    #[serde(default, deserialize_with = "de_lenient_i64")]
    pub execution_time_ms: Option<i64>,
    #[serde(default)]
    pub status: TraceStatus,
    #[serde(default)]
    pub request_metadata: Vec<KeyValue>,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

impl TraceInfo {
    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }

    /// Look up a request metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.request_metadata
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }

    /// Claude Code session id, when recorded.
    pub fn session_id(&self) -> Option<&str> {
        self.metadata(SESSION_METADATA_KEY)
    }

    /// Tags as an ordered map.
    pub fn tag_map(&self) -> BTreeMap<&str, &str> {
        self.tags
            .iter()
            .map(|kv| (kv.key.as_str(), kv.value.as_str()))
            .collect()
    }

    /// Start time as a UTC timestamp.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_ms.and_then(DateTime::from_timestamp_millis)
    }
}

/// Accept int64 fields encoded either as JSON numbers or strings.
fn de_lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(i64),
        Str(String),
    }

    Ok(match Option::<NumOrString>::deserialize(deserializer)? {
        Some(NumOrString::Num(n)) => Some(n),
        Some(NumOrString::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Parameters for a trace search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceQuery {
    pub experiment_ids: Vec<String>,
    pub filter: Option<String>,
    pub max_results: usize,
    pub order_by: Vec<String>,
    pub page_token: Option<String>,
}

impl TraceQuery {
    /// Newest-first query over one experiment.
    pub fn recent(experiment_id: impl Into<String>, max_results: usize) -> Self {
        Self {
            experiment_ids: vec![experiment_id.into()],
            filter: None,
            max_results,
            order_by: vec!["timestamp_ms DESC".to_string()],
            page_token: None,
        }
    }

    /// Only traces started after the given time.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.filter = Some(format!("attributes.timestamp_ms > {}", since.timestamp_millis()));
        self
    }

    /// URL query parameters.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = self
            .experiment_ids
            .iter()
            .map(|id| ("experiment_ids", id.clone()))
            .collect();
        if let Some(filter) = &self.filter {
            params.push(("filter", filter.clone()));
        }
        params.push(("max_results", self.max_results.to_string()));
        for order in &self.order_by {
            params.push(("order_by", order.clone()));
        }
        if let Some(token) = &self.page_token {
            params.push(("page_token", token.clone()));
        }
        params
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TracePage {
    #[serde(default)]
    pub traces: Vec<TraceInfo>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl TracePage {
    /// Token for the next page, treating empty strings as absent.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetExperimentResponse {
    pub experiment: Experiment,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetTraceInfoResponse {
    pub trace_info: TraceInfo,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetTraceTagRequest<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentUserResponse {
    #[serde(rename = "userName", default)]
    pub user_name: Option<String>,
}

/// Error body returned by MLflow.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_info_numeric_fields() {
        let info: TraceInfo = serde_json::from_value(json!({
            "request_id": "tr-1",
            "experiment_id": "42",
            "timestamp_ms": 1700000000000i64,
            "execution_time_ms": "1500",
            "status": "OK",
            "request_metadata": [{"key": "mlflow.trace.session", "value": "sess-1"}],
            "tags": [{"key": "git.branch", "value": "main"}]
        }))
        .unwrap();

        assert_eq!(info.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(info.execution_time_ms, Some(1500));
        assert_eq!(info.status, TraceStatus::Ok);
        assert_eq!(info.session_id(), Some("sess-1"));
        assert_eq!(info.tag("git.branch"), Some("main"));
        assert_eq!(info.tag("git.commit_id"), None);
        assert_eq!(
            info.started_at().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_trace_info_minimal() {
        let info: TraceInfo = serde_json::from_value(json!({"request_id": "tr-2", "status": "SOMETHING_NEW"})).unwrap();
        assert_eq!(info.status, TraceStatus::TraceStatusUnspecified);
        assert!(info.timestamp_ms.is_none());
        assert!(info.tags.is_empty());
    }

    #[test]
    fn test_query_params() {
        let since = DateTime::from_timestamp_millis(1000).unwrap();
        let query = TraceQuery::recent("7", 20).since(since);
        let params = query.to_params();
        assert!(params.contains(&("experiment_ids", "7".to_string())));
        assert!(params.contains(&("filter", "attributes.timestamp_ms > 1000".to_string())));
        assert!(params.contains(&("max_results", "20".to_string())));
        assert!(params.contains(&("order_by", "timestamp_ms DESC".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "page_token"));
    }

    #[test]
    fn test_page_token_empty_is_none() {
        let page: TracePage = serde_json::from_value(json!({"traces": [], "next_page_token": ""})).unwrap();
        assert!(page.next_token().is_none());
    }
}
