// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Access to the MLflow tracking service.
//!
//! Trace capture itself is done by MLflow's own Claude Code hook; this
//! module only needs to look up experiments, find traces and tag them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use claude_tracing::tracking::{MlflowClient, TrackingBackend};
//!
//! let client = MlflowClient::connect(&config.target).await?;
//! let experiment = client.get_experiment_by_name("/Workspace/Shared/proj").await?;
//! ```

mod auth;
mod client;
mod types;

pub use auth::{endpoint_from_profile, resolve_endpoint, Endpoint, MLFLOW_TRACKING_TOKEN_ENV};
pub use client::{LazyClient, MlflowClient, DEFAULT_TIMEOUT_SECS};
pub use types::{
    Experiment, KeyValue, TraceInfo, TracePage, TraceQuery, TraceStatus, INPUTS_METADATA_KEY,
    OUTPUTS_METADATA_KEY, SESSION_METADATA_KEY,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TrackingError;

/// Largest page requested from the search endpoint.
pub const MAX_PAGE_SIZE: usize = 100;

/// Operations needed from a tracking service.
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Look up an experiment. A missing experiment is `Ok(None)`.
    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, TrackingError>;

    /// Fetch one page of traces.
    async fn search_traces(&self, query: &TraceQuery) -> Result<TracePage, TrackingError>;

    /// Fetch a single trace.
    async fn get_trace_info(&self, request_id: &str) -> Result<TraceInfo, TrackingError>;

    /// Set or overwrite a tag on a trace.
    async fn set_trace_tag(&self, request_id: &str, key: &str, value: &str) -> Result<(), TrackingError>;

    /// Login name of the authenticated user, where the backend knows it.
    async fn current_user(&self) -> Result<Option<String>, TrackingError>;
}

/// Look up an experiment, failing when it does not exist.
pub async fn require_experiment(
    backend: &dyn TrackingBackend,
    name: &str,
) -> Result<Experiment, TrackingError> {
    backend
        .get_experiment_by_name(name)
        .await?
        .ok_or_else(|| TrackingError::ExperimentNotFound(name.to_string()))
}

/// Newest traces of an experiment, following pagination up to `limit`.
pub async fn recent_traces(
    backend: &dyn TrackingBackend,
    experiment_id: &str,
    limit: usize,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<TraceInfo>, TrackingError> {
    let mut traces = Vec::new();
    let mut page_token: Option<String> = None;

    while traces.len() < limit {
        let mut query = TraceQuery::recent(experiment_id, (limit - traces.len()).min(MAX_PAGE_SIZE));
        if let Some(since) = since {
            query = query.since(since);
        }
        query.page_token = page_token.take();

        let page = backend.search_traces(&query).await?;
        let next = page.next_token().map(String::from);
        let fetched = page.traces.len();
        traces.extend(page.traces);

        match next {
            Some(token) if fetched > 0 => page_token = Some(token),
            _ => break,
        }
    }

    traces.truncate(limit);
    Ok(traces)
}
