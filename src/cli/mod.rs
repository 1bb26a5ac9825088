// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Command handlers for the `traces` binary.

pub mod enrichment;
pub mod hook;
pub mod init;
pub mod traces;

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{load_config, CliOptions, ResolvedConfig};
use crate::error::ConfigError;

pub use enrichment::{EnrichmentArgs, EnrichmentCommand};
pub use hook::{HookArgs, HookCommand};
pub use init::InitArgs;
pub use traces::{ListArgs, SearchArgs};

/// Start a spinner on stderr.
pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a yellow warning line.
pub(crate) fn warn(message: impl AsRef<str>) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message.as_ref());
}

/// Resolve configuration and require an experiment.
pub(crate) fn resolve_experiment(
    project_root: &Path,
    experiment: Option<String>,
) -> Result<(ResolvedConfig, String), ConfigError> {
    let config = load_config(
        project_root,
        CliOptions {
            experiment,
            ..Default::default()
        },
    )?;
    require_experiment_name(config)
}

fn require_experiment_name(config: ResolvedConfig) -> Result<(ResolvedConfig, String), ConfigError> {
    let experiment = config
        .experiment
        .clone()
        .ok_or(ConfigError::MissingExperiment)?;
    Ok((config, experiment))
}
