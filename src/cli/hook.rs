// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `traces hook`: entry points invoked by Claude Code.

use std::path::Path;

use clap::{Args, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::error;

use crate::config::{load_config, CliOptions};
use crate::enrichment::SystemGit;
use crate::hook::{HookResponse, MlflowHookCommand, StopHook};
use crate::tracking::LazyClient;

/// Hook subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum HookCommand {
    /// Create and enrich the trace when a session stops
    Stop,
}

/// Hook handlers (called by Claude Code, not by hand)
#[derive(Debug, Clone, Args)]
pub struct HookArgs {
    #[command(subcommand)]
    pub command: HookCommand,
}

impl HookArgs {
    /// Run the hook, print its JSON response and return the exit code.
    pub async fn execute(self, project_root: &Path) -> i32 {
        match self.command {
            HookCommand::Stop => {
                let (response, code) = match run_stop(project_root).await {
                    Ok(response) => (response, 0),
                    Err(e) => {
                        error!("Error in enriched Stop hook: {:#}", e);
                        (HookResponse::error(e.to_string()), 1)
                    }
                };
                println!("{}", response.to_json());
                code
            }
        }
    }
}

async fn run_stop(project_root: &Path) -> anyhow::Result<HookResponse> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;

    let config = load_config(project_root, CliOptions::default())?;
    let creator = MlflowHookCommand::for_config(project_root, &config);
    let git = SystemGit::new(project_root);
    let backend = LazyClient::new(config.target.clone());

    let hook = StopHook {
        config,
        creator: &creator,
        git: &git,
        backend: &backend,
    };
    hook.handle(&input).await
}
