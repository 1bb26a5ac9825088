// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MLflow REST client.
//!
//! Implements [`TrackingBackend`] against the MLflow 2.0 REST API as served
//! by Databricks workspaces and self-hosted `mlflow server` instances.
//!
//! # API Reference
//!
//! See [MLflow REST API](https://mlflow.org/docs/latest/rest-api.html) for details.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::config::TrackingTarget;
use crate::error::TrackingError;

use super::auth::{resolve_endpoint, Endpoint};
use super::types::{
    ApiErrorBody, CurrentUserResponse, Experiment, GetExperimentResponse, GetTraceInfoResponse,
    SetTraceTagRequest, TraceInfo, TracePage, TraceQuery,
};
use super::TrackingBackend;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// MLflow error code for missing resources.
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// MLflow tracking client.
pub struct MlflowClient {
    client: Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl MlflowClient {
    /// Create a client for a resolved endpoint.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, TrackingError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("claude-tracing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackingError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Resolve credentials for a target and create a client.
    pub async fn connect(target: &TrackingTarget) -> Result<Self, TrackingError> {
        let endpoint = resolve_endpoint(target).await?;
        Self::new(endpoint, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.endpoint.base_url, path));
        match &self.endpoint.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TrackingError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TrackingError::Timeout(self.timeout.as_millis() as u64)
            } else {
                TrackingError::from(e)
            }
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, TrackingError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status.as_u16(), &body));
        }
        response
            .json()
            .await
            .map_err(|e| TrackingError::Parse(e.to_string()))
    }

    /// Map an error response to a [`TrackingError`].
    fn handle_error_response(status_code: u16, body: &str) -> TrackingError {
        let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .map(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        match status_code {
            401 | 403 => TrackingError::Auth(message),
            _ => TrackingError::api(message, status_code),
        }
    }

    fn is_not_found(status_code: u16, body: &str) -> bool {
        status_code == 404
            || serde_json::from_str::<ApiErrorBody>(body)
                .map(|e| e.error_code == RESOURCE_DOES_NOT_EXIST)
                .unwrap_or(false)
    }
}

#[async_trait]
impl TrackingBackend for MlflowClient {
    #[cfg_attr(feature = "telemetry", instrument(skip(self)))]
    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, TrackingError> {
        let response = self
            .send(
                self.request(Method::GET, "/api/2.0/mlflow/experiments/get-by-name")
                    .query(&[("experiment_name", name)]),
            )
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            if Self::is_not_found(status, &body) {
                return Ok(None);
            }
            return Err(Self::handle_error_response(status, &body));
        }

        let parsed: GetExperimentResponse = response
            .json()
            .await
            .map_err(|e| TrackingError::Parse(e.to_string()))?;
        Ok(Some(parsed.experiment))
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, query), fields(max_results = query.max_results)))]
    async fn search_traces(&self, query: &TraceQuery) -> Result<TracePage, TrackingError> {
        let response = self
            .send(
                self.request(Method::GET, "/api/2.0/mlflow/traces")
                    .query(&query.to_params()),
            )
            .await?;
        let page: TracePage = self.read_json(response).await?;

        #[cfg(feature = "telemetry")]
        debug!(count = page.traces.len(), "Searched traces");

        Ok(page)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self)))]
    async fn get_trace_info(&self, request_id: &str) -> Result<TraceInfo, TrackingError> {
        let path = format!("/api/2.0/mlflow/traces/{}/info", request_id);
        let response = self.send(self.request(Method::GET, &path)).await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            if Self::is_not_found(status, &body) {
                return Err(TrackingError::TraceNotFound(request_id.to_string()));
            }
            return Err(Self::handle_error_response(status, &body));
        }

        let parsed: GetTraceInfoResponse = response
            .json()
            .await
            .map_err(|e| TrackingError::Parse(e.to_string()))?;
        Ok(parsed.trace_info)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, value)))]
    async fn set_trace_tag(&self, request_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        let path = format!("/api/2.0/mlflow/traces/{}/tags", request_id);
        let response = self
            .send(
                self.request(Method::PATCH, &path)
                    .json(&SetTraceTagRequest { key, value }),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<String>, TrackingError> {
        if !self.endpoint.databricks {
            return Ok(None);
        }
        let response = self
            .send(self.request(Method::GET, "/api/2.0/preview/scim/v2/Me"))
            .await?;
        let me: CurrentUserResponse = self.read_json(response).await?;
        Ok(me.user_name)
    }
}

/// A client that resolves credentials on first use.
///
/// The hook only talks to the tracking service when enrichments are active,
/// so the token lookup (which may shell out to the Databricks CLI) is deferred.
pub struct LazyClient {
    target: TrackingTarget,
    cell: OnceCell<MlflowClient>,
}

impl LazyClient {
    pub fn new(target: TrackingTarget) -> Self {
        Self {
            target,
            cell: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&MlflowClient, TrackingError> {
        self.cell
            .get_or_try_init(|| MlflowClient::connect(&self.target))
            .await
    }
}

#[async_trait]
impl TrackingBackend for LazyClient {
    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, TrackingError> {
        self.client().await?.get_experiment_by_name(name).await
    }

    async fn search_traces(&self, query: &TraceQuery) -> Result<TracePage, TrackingError> {
        self.client().await?.search_traces(query).await
    }

    async fn get_trace_info(&self, request_id: &str) -> Result<TraceInfo, TrackingError> {
        self.client().await?.get_trace_info(request_id).await
    }

    async fn set_trace_tag(&self, request_id: &str, key: &str, value: &str) -> Result<(), TrackingError> {
        self.client().await?.set_trace_tag(request_id, key, value).await
    }

    async fn current_user(&self) -> Result<Option<String>, TrackingError> {
        self.client().await?.current_user().await
    }
}
