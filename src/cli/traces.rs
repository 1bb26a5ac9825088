// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `traces list` and `traces search`.

use std::path::Path;

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, ValueEnum};

use crate::config::{load_config, CliOptions};
use crate::enrichment::{get_git_metadata, get_recent_commits, SystemGit};
use crate::error::Result;
use crate::output::{format_context, format_trace_table, format_traces_json, traces_summary_json, RepoSummary};
use crate::tracking::{recent_traces, require_experiment, LazyClient, TraceInfo, TrackingBackend};

use super::{resolve_experiment, spinner};

/// Default number of traces shown.
pub const DEFAULT_LIMIT: usize = 20;

/// Default search window in hours.
pub const DEFAULT_HOURS: i64 = 24;

/// Commits shown in the repository summary.
const CONTEXT_COMMITS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchFormat {
    Json,
    Context,
}

/// List recent traces
#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Experiment name or path
    #[arg(short, long)]
    pub experiment: Option<String>,

    /// Maximum number of traces
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: ListFormat,
}

/// Search traces by time window or id
#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Experiment name or path
    #[arg(short, long)]
    pub experiment: Option<String>,

    /// Only traces from the last N hours
    #[arg(long, default_value_t = DEFAULT_HOURS)]
    pub hours: i64,

    /// Fetch a single trace by id
    #[arg(long)]
    pub trace_id: Option<String>,

    /// Maximum number of traces
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "context")]
    pub format: SearchFormat,
}

impl ListArgs {
    /// Execute the list command.
    pub async fn execute(self, project_root: &Path) -> Result<()> {
        let (config, experiment) = resolve_experiment(project_root, self.experiment.clone())?;
        let backend = LazyClient::new(config.target);

        let pb = spinner(format!("Fetching traces from {}...", experiment));
        let result = fetch_recent(&backend, &experiment, self.limit, None).await;
        pb.finish_and_clear();
        let traces = result?;

        match self.format {
            ListFormat::Table => println!("{}", format_trace_table(&traces)),
            ListFormat::Json => println!("{}", serde_json::to_string_pretty(&traces_summary_json(&traces))?),
        }
        Ok(())
    }
}

impl SearchArgs {
    /// Execute the search command.
    pub async fn execute(self, project_root: &Path) -> Result<()> {
        if self.hours <= 0 {
            anyhow::bail!("--hours must be positive");
        }
        let traces = match &self.trace_id {
            Some(id) => {
                let config = load_config(project_root, CliOptions::default())?;
                let backend = LazyClient::new(config.target);
                let pb = spinner(format!("Fetching trace {}...", id));
                let result = backend.get_trace_info(id).await;
                pb.finish_and_clear();
                vec![result?]
            }
            None => {
                let (config, experiment) = resolve_experiment(project_root, self.experiment.clone())?;
                let backend = LazyClient::new(config.target);
                let since = Utc::now() - ChronoDuration::hours(self.hours);
                let pb = spinner(format!("Searching the last {}h of {}...", self.hours, experiment));
                let result = fetch_recent(&backend, &experiment, self.limit, Some(since)).await;
                pb.finish_and_clear();
                result?
            }
        };

        match self.format {
            SearchFormat::Json => println!("{}", format_traces_json(&traces)?),
            SearchFormat::Context => {
                let repo = repo_summary(project_root).await;
                println!("{}", format_context(&traces, Some(&repo)));
            }
        }
        Ok(())
    }
}

async fn fetch_recent(
    backend: &dyn TrackingBackend,
    experiment: &str,
    limit: usize,
    since: Option<chrono::DateTime<Utc>>,
) -> Result<Vec<TraceInfo>> {
    let exp = require_experiment(backend, experiment).await?;
    Ok(recent_traces(backend, &exp.experiment_id, limit, since).await?)
}

/// Branch, commit and recent commits of the working copy.
pub async fn repo_summary(project_root: &Path) -> RepoSummary {
    let git = SystemGit::new(project_root);
    let meta = get_git_metadata(&git).await;
    RepoSummary {
        branch: meta.get("git.branch").cloned(),
        commit: meta.get("git.commit_id").cloned(),
        recent_commits: get_recent_commits(&git, CONTEXT_COMMITS).await,
    }
}
