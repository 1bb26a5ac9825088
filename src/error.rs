// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the tracing setup tool.
//!
//! This module provides strongly-typed errors for different parts of the application,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.

use thiserror::Error;

/// Errors that can occur while talking to the MLflow tracking service.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Tracking backend not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl TrackingError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api {
                status_code: Some(code),
                ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Check if this is an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors that can occur while reading or writing `.claude/settings.json`.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    NotFound(String),

    #[error("Tracing is not initialized in {0}; run 'traces init' first")]
    NotInitialized(String),

    #[error("Invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON parsing error: {0}")]
    Json(String),
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Errors that can occur while resolving or collecting enrichments.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Unknown enrichment '{name}' (available: {valid})")]
    Unknown { name: String, valid: String },

    #[error(
        "Enrichments need a tracking server; the local mlruns/ store cannot be tagged. \
         Run 'traces init --local --tracking-uri http://127.0.0.1:5000' or target Databricks"
    )]
    LocalStore,

    #[error("Transcript error: {0}")]
    Transcript(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EnrichmentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that can occur while resolving profiles and tracking configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Databricks profile not found: {0}")]
    ProfileNotFound(String),

    #[error("No Databricks profiles configured in {0}; run 'databricks auth login' first")]
    NoProfiles(String),

    #[error("Several Databricks profiles found ({0}); pick one with --profile")]
    AmbiguousProfile(String),

    #[error("No experiment configured; pass --experiment or run 'traces init'")]
    MissingExperiment,

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    Io(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
