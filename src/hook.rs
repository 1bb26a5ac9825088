// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The enriched `Stop` hook.
//!
//! Claude Code runs the hook at the end of a session with a JSON payload on
//! stdin and expects a JSON response on stdout. The trace is created by
//! MLflow's own hook, run as a subprocess; this module then finds that trace
//! and attaches enrichment tags to it.
//!
//! # Flow
//!
//! 1. Exit early when tracing is disabled
//! 2. Parse the payload and run the MLflow hook with it
//! 3. Resolve active enrichments (environment, then settings file)
//! 4. Locate the new trace by session id and tag it

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::config::{
    ResolvedConfig, DATABRICKS_PROFILE_ENV, EXPERIMENT_NAME_ENV, TRACING_ENABLED_ENV,
    TRACKING_URI_ENV,
};
use crate::enrichment::{collect_tags, EnrichmentContext, EnrichmentSet, GitRunner};
use crate::error::{Result, TrackingError};
use crate::settings::DEFAULT_HOOK_COMMAND;
use crate::tracking::{recent_traces, require_experiment, TraceInfo, TrackingBackend};

/// How long the MLflow hook may take to build and upload the trace.
pub const BASE_HOOK_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of recent traces searched for the session's trace.
pub const TRACE_LOOKUP_WINDOW: usize = 20;

/// Payload Claude Code sends to `Stop` hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
}

impl HookInput {
    /// Parse a payload. Empty input is an empty payload.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).context("Invalid hook payload")
    }
}

/// Response printed for Claude Code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(rename = "stopReason", default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl HookResponse {
    pub fn ok() -> Self {
        Self {
            proceed: true,
            stop_reason: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            proceed: false,
            stop_reason: Some(reason.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"continue":true}"#.to_string())
    }
}

/// Creates the trace for a finished session.
#[async_trait]
pub trait TraceCreator: Send + Sync {
    /// Create the trace from the raw hook payload.
    async fn create_trace(&self, payload: &str) -> Result<()>;
}

/// Runs MLflow's stock Claude Code hook in a shell.
pub struct MlflowHookCommand {
    command: String,
    cwd: PathBuf,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl MlflowHookCommand {
    /// The default hook command, with tracking variables taken from `config`.
    ///
    /// Claude Code does not always export the settings environment to hooks,
    /// so the resolved values are passed explicitly.
    pub fn for_config(cwd: impl AsRef<Path>, config: &ResolvedConfig) -> Self {
        let mut envs = vec![(TRACING_ENABLED_ENV.to_string(), "true".to_string())];
        if let Some(experiment) = &config.experiment {
            envs.push((EXPERIMENT_NAME_ENV.to_string(), experiment.clone()));
        }
        if let Some(uri) = config.target.tracking_uri() {
            envs.push((TRACKING_URI_ENV.to_string(), uri));
        }
        if let Some(profile) = config.target.profile() {
            envs.push((DATABRICKS_PROFILE_ENV.to_string(), profile.to_string()));
        }

        Self {
            command: DEFAULT_HOOK_COMMAND.to_string(),
            cwd: cwd.as_ref().to_path_buf(),
            envs,
            timeout: BASE_HOOK_TIMEOUT,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TraceCreator for MlflowHookCommand {
    async fn create_trace(&self, payload: &str) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().context("Failed to start the MLflow hook")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .context("Failed to send payload to the MLflow hook")?;
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.context("MLflow hook failed")?,
            Err(_) => bail!("MLflow hook timed out after {} seconds", self.timeout.as_secs()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(stdout = %stdout.trim(), "MLflow hook finished");

        if !output.status.success() {
            bail!(
                "MLflow hook exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // The MLflow hook reports its own failures through its response.
        if let Ok(response) = serde_json::from_str::<HookResponse>(stdout.trim()) {
            if !response.proceed {
                return Err(anyhow!(response
                    .stop_reason
                    .unwrap_or_else(|| "MLflow hook failed".to_string())));
            }
        }
        Ok(())
    }
}

/// Enrichments for the hook: the process environment wins over the settings file.
pub fn active_enrichments(config: &ResolvedConfig) -> EnrichmentSet {
    config
        .enrichments
        .as_deref()
        .map(EnrichmentSet::parse_lenient)
        .unwrap_or_default()
}

/// Find the trace created for a session among the newest traces.
///
/// Without a session id, or when the newest trace carries no session
/// metadata, the newest trace is used.
pub async fn find_session_trace(
    backend: &dyn TrackingBackend,
    experiment_id: &str,
    session_id: Option<&str>,
) -> Result<Option<TraceInfo>> {
    let traces = recent_traces(backend, experiment_id, TRACE_LOOKUP_WINDOW, None).await?;

    let Some(session_id) = session_id else {
        return Ok(traces.into_iter().next());
    };

    if let Some(found) = traces.iter().find(|t| t.session_id() == Some(session_id)) {
        return Ok(Some(found.clone()));
    }

    Ok(traces.into_iter().next().filter(|t| t.session_id().is_none()))
}

/// Set each tag on a trace, returning how many were written.
///
/// A failing tag is logged and skipped.
pub async fn apply_tags(
    backend: &dyn TrackingBackend,
    request_id: &str,
    tags: &std::collections::BTreeMap<String, String>,
) -> usize {
    let mut written = 0;
    for (key, value) in tags {
        match backend.set_trace_tag(request_id, key, value).await {
            Ok(()) => written += 1,
            Err(e) => warn!(key = %key, "Failed to set trace tag: {}", e),
        }
    }
    written
}

/// The enriched stop hook with its collaborators.
pub struct StopHook<'a> {
    pub config: ResolvedConfig,
    pub creator: &'a dyn TraceCreator,
    pub git: &'a dyn GitRunner,
    pub backend: &'a dyn TrackingBackend,
}

impl StopHook<'_> {
    /// Handle one hook invocation.
    ///
    /// Recoverable problems become an error response; `Err` means the hook
    /// itself failed and should exit non-zero.
    #[cfg_attr(feature = "telemetry", instrument(skip_all))]
    pub async fn handle(&self, raw_input: &str) -> Result<HookResponse> {
        if !self.config.tracing_enabled {
            debug!("Tracing disabled, nothing to do");
            return Ok(HookResponse::ok());
        }

        let input = HookInput::parse(raw_input)?;
        let Some(transcript_path) = input.transcript_path.clone() else {
            return Ok(HookResponse::error("No transcript_path provided"));
        };

        self.creator.create_trace(raw_input).await?;

        let active = active_enrichments(&self.config);
        debug!(%active, "Active enrichments");
        if active.is_empty() {
            return Ok(HookResponse::ok());
        }

        let experiment = self
            .config
            .experiment
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", EXPERIMENT_NAME_ENV))?;
        let exp = match require_experiment(self.backend, experiment).await {
            Ok(exp) => exp,
            Err(TrackingError::NotConfigured(reason)) => {
                warn!("Trace created without enrichment tags: {}", reason);
                return Ok(HookResponse::ok());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(trace) =
            find_session_trace(self.backend, &exp.experiment_id, input.session_id.as_deref()).await?
        else {
            return Ok(HookResponse::error(
                "Failed to find the session trace, check .claude/mlflow/claude_tracing.log",
            ));
        };

        let ctx = EnrichmentContext {
            git: self.git,
            transcript_path: Some(PathBuf::from(transcript_path)),
        };
        let tags = collect_tags(&active, &ctx).await;
        if tags.is_empty() {
            return Ok(HookResponse::ok());
        }

        info!(
            trace = %trace.request_id,
            keys = ?tags.keys().collect::<Vec<_>>(),
            "Setting trace tags"
        );
        let written = apply_tags(self.backend, &trace.request_id, &tags).await;
        debug!(written, total = tags.len(), "Trace tags written");

        Ok(HookResponse::ok())
    }
}
