// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Environment variable enabling the MLflow Claude Code hook.
pub const TRACING_ENABLED_ENV: &str = "MLFLOW_CLAUDE_TRACING_ENABLED";

/// Environment variable naming the MLflow experiment.
pub const EXPERIMENT_NAME_ENV: &str = "MLFLOW_EXPERIMENT_NAME";

/// Environment variable naming the MLflow tracking URI.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// Environment variable naming the Databricks CLI profile.
pub const DATABRICKS_PROFILE_ENV: &str = "DATABRICKS_CONFIG_PROFILE";

/// Environment variable holding a Databricks personal access token.
pub const DATABRICKS_TOKEN_ENV: &str = "DATABRICKS_TOKEN";

/// Environment variable overriding the Databricks config file location.
pub const DATABRICKS_CONFIG_FILE_ENV: &str = "DATABRICKS_CONFIG_FILE";

/// Profile used when none is named.
pub const DEFAULT_PROFILE: &str = "DEFAULT";

/// A profile from `~/.databrickscfg`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabricksProfile {
    /// Section name.
    pub name: String,
    /// Workspace URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Personal access token, if stored in the file.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Authentication type (`pat`, `databricks-cli`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
}

impl DatabricksProfile {
    /// Host URL with an `https://` scheme and no trailing slash.
    pub fn normalized_host(&self) -> Option<String> {
        self.host.as_deref().map(normalize_host)
    }
}

/// Ensure a workspace URL has a scheme and no trailing slash.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Where traces are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingTarget {
    /// A Databricks workspace reached through a CLI profile.
    Databricks { profile: String },
    /// A self-hosted MLflow tracking server.
    Server { uri: String },
    /// MLflow's local `mlruns/` file store.
    LocalFiles,
}

impl TrackingTarget {
    /// Interpret an `MLFLOW_TRACKING_URI` value.
    ///
    /// `fallback_profile` is used for a bare `databricks` URI.
    pub fn from_uri(uri: &str, fallback_profile: Option<&str>) -> Self {
        let uri = uri.trim();
        if let Some(profile) = uri.strip_prefix("databricks://") {
            let profile = if profile.is_empty() {
                fallback_profile.unwrap_or(DEFAULT_PROFILE)
            } else {
                profile
            };
            return TrackingTarget::Databricks {
                profile: profile.to_string(),
            };
        }
        if uri == "databricks" {
            return TrackingTarget::Databricks {
                profile: fallback_profile.unwrap_or(DEFAULT_PROFILE).to_string(),
            };
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return TrackingTarget::Server {
                uri: uri.trim_end_matches('/').to_string(),
            };
        }
        TrackingTarget::LocalFiles
    }

    /// Value for `MLFLOW_TRACKING_URI`, if one should be set.
    pub fn tracking_uri(&self) -> Option<String> {
        match self {
            TrackingTarget::Databricks { profile } => Some(format!("databricks://{}", profile)),
            TrackingTarget::Server { uri } => Some(uri.clone()),
            TrackingTarget::LocalFiles => None,
        }
    }

    /// Databricks profile name, when targeting Databricks.
    pub fn profile(&self) -> Option<&str> {
        match self {
            TrackingTarget::Databricks { profile } => Some(profile),
            _ => None,
        }
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match self {
            TrackingTarget::Databricks { profile } => format!("Databricks (profile '{}')", profile),
            TrackingTarget::Server { uri } => format!("MLflow server at {}", uri),
            TrackingTarget::LocalFiles => "local file store (mlruns/)".to_string(),
        }
    }
}

/// Fully resolved tracking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    /// Tracking backend.
    pub target: TrackingTarget,
    /// Experiment name or workspace path.
    pub experiment: Option<String>,
    /// Whether the Claude Code hook is switched on.
    pub tracing_enabled: bool,
    /// Raw enrichment selection, as stored.
    pub enrichments: Option<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            target: TrackingTarget::LocalFiles,
            experiment: None,
            tracing_enabled: false,
            enrichments: None,
        }
    }
}

/// Interpret an environment flag the way MLflow does.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
