// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credentials for the tracking service.
//!
//! Databricks tokens are taken from the profile, then `DATABRICKS_TOKEN`,
//! then `databricks auth token` for OAuth (`databricks-cli`) profiles.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{
    load_profiles, DatabricksProfile, TrackingTarget, DATABRICKS_TOKEN_ENV,
};
use crate::error::TrackingError;

/// Environment variable holding a bearer token for a self-hosted server.
pub const MLFLOW_TRACKING_TOKEN_ENV: &str = "MLFLOW_TRACKING_TOKEN";

/// Timeout for the Databricks CLI token helper.
const TOKEN_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to send requests and how to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub token: Option<String>,
    pub databricks: bool,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("databricks", &self.databricks)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CliToken {
    access_token: String,
}

/// Resolve the endpoint for a tracking target.
pub async fn resolve_endpoint(target: &TrackingTarget) -> Result<Endpoint, TrackingError> {
    match target {
        TrackingTarget::Databricks { profile } => {
            let profiles = load_profiles().map_err(|e| TrackingError::NotConfigured(e.to_string()))?;
            let entry = profiles
                .into_iter()
                .find(|p| &p.name == profile)
                .ok_or_else(|| {
                    TrackingError::NotConfigured(format!("Databricks profile '{}' not found", profile))
                })?;

            let env_token = std::env::var(DATABRICKS_TOKEN_ENV).ok();
            let mut endpoint = endpoint_from_profile(&entry, env_token)?;
            if endpoint.token.is_none() {
                endpoint.token = Some(cli_token(profile).await?);
            }
            Ok(endpoint)
        }
        TrackingTarget::Server { uri } => Ok(Endpoint {
            base_url: uri.trim_end_matches('/').to_string(),
            token: std::env::var(MLFLOW_TRACKING_TOKEN_ENV)
                .ok()
                .filter(|t| !t.is_empty()),
            databricks: false,
        }),
        TrackingTarget::LocalFiles => Err(TrackingError::NotConfigured(
            "the local mlruns/ store has no REST API; start `mlflow server` and re-run \
             'traces init --local --tracking-uri http://127.0.0.1:5000'"
                .to_string(),
        )),
    }
}

/// Build an endpoint from a profile. The token may still need the CLI helper.
pub fn endpoint_from_profile(
    profile: &DatabricksProfile,
    env_token: Option<String>,
) -> Result<Endpoint, TrackingError> {
    let base_url = profile.normalized_host().ok_or_else(|| {
        TrackingError::NotConfigured(format!("profile '{}' has no host", profile.name))
    })?;

    let token = profile
        .token
        .clone()
        .or(env_token)
        .filter(|t| !t.trim().is_empty());

    Ok(Endpoint {
        base_url,
        token,
        databricks: true,
    })
}

/// Ask the Databricks CLI for an OAuth access token.
async fn cli_token(profile: &str) -> Result<String, TrackingError> {
    debug!(profile, "Requesting token from databricks CLI");

    let mut cmd = Command::new("databricks");
    cmd.args(["auth", "token", "--profile", profile, "-o", "json"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(TOKEN_COMMAND_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(TrackingError::Auth(format!(
                "could not run the databricks CLI ({}); install it or add a token to the profile",
                e
            )))
        }
        Err(_) => return Err(TrackingError::Timeout(TOKEN_COMMAND_TIMEOUT.as_millis() as u64)),
    };

    if !output.status.success() {
        return Err(TrackingError::Auth(format!(
            "profile '{}' has no valid session: {}. Re-authenticate with: databricks auth login --profile {}",
            profile,
            String::from_utf8_lossy(&output.stderr).trim(),
            profile
        )));
    }

    parse_cli_token(&String::from_utf8_lossy(&output.stdout))
}

fn parse_cli_token(stdout: &str) -> Result<String, TrackingError> {
    serde_json::from_str::<CliToken>(stdout)
        .map(|t| t.access_token)
        .map_err(|e| TrackingError::Parse(format!("databricks auth token output: {}", e)))
}
