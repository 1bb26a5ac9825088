// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `traces enrichment`: choose which metadata is attached to traces.

use std::path::Path;

use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::TrackingTarget;
use crate::consistency::{check_consistency, DEFAULT_SAMPLE_SIZE};
use crate::enrichment::{parse_names, Enrichment, EnrichmentSet};
use crate::error::{EnrichmentError, Result};
use crate::settings::{load_existing_settings, load_settings, save_settings, settings_path};
use crate::tracking::LazyClient;

use super::{resolve_experiment, spinner, warn};

/// Enrichment subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum EnrichmentCommand {
    /// List available enrichments and whether they are enabled
    #[command(alias = "ls")]
    List,

    /// Show the tags an enrichment adds
    Info {
        /// Enrichment name
        name: String,
    },

    /// Enable enrichments
    Add {
        /// Enrichment names (git, files, tokens)
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Disable enrichments
    #[command(alias = "rm")]
    Remove {
        /// Enrichment names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Compare local enrichments with recent traces in the experiment
    Check {
        /// Experiment name or path
        #[arg(short, long)]
        experiment: Option<String>,

        /// Number of recent traces to inspect
        #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
        sample: usize,
    },
}

/// Manage trace enrichments
#[derive(Debug, Clone, Args)]
pub struct EnrichmentArgs {
    #[command(subcommand)]
    pub command: EnrichmentCommand,
}

/// What an add or remove changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentUpdate {
    pub changed: Vec<Enrichment>,
    pub unchanged: Vec<Enrichment>,
    pub active: EnrichmentSet,
}

/// Enable or disable enrichments in the project's settings.
///
/// Unknown names abort before anything is written, as does enabling
/// enrichments for the local file store.
pub fn update_enrichments<S: AsRef<str>>(
    project_root: &Path,
    names: &[S],
    enable: bool,
) -> Result<EnrichmentUpdate> {
    let requested = parse_names(names)?;
    let mut settings = load_existing_settings(project_root)?;
    if enable && settings.tracking_target() == TrackingTarget::LocalFiles {
        return Err(EnrichmentError::LocalStore.into());
    }
    let mut active = settings.enrichments();

    let mut update = EnrichmentUpdate::default();
    for enrichment in requested {
        let changed = if enable {
            active.insert(enrichment)
        } else {
            active.remove(enrichment)
        };
        if changed {
            update.changed.push(enrichment);
        } else if !update.unchanged.contains(&enrichment) {
            update.unchanged.push(enrichment);
        }
    }

    if !update.changed.is_empty() {
        let location = settings_path(project_root).display().to_string();
        settings.set_enrichments(&active, &location)?;
        save_settings(project_root, &settings)?;
    }
    update.active = active;
    Ok(update)
}

fn join(enrichments: &[Enrichment]) -> String {
    enrichments.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
}

impl EnrichmentArgs {
    /// Execute the enrichment command.
    pub async fn execute(self, project_root: &Path) -> Result<()> {
        match self.command {
            EnrichmentCommand::List => list(project_root),
            EnrichmentCommand::Info { name } => info(&name),
            EnrichmentCommand::Add { names } => {
                let update = update_enrichments(project_root, &names[..], true)?;
                if !update.changed.is_empty() {
                    println!("{} Enabled: {}", "✓".green(), join(&update.changed).cyan());
                }
                if !update.unchanged.is_empty() {
                    println!("Already enabled: {}", join(&update.unchanged));
                }
                println!("Active enrichments: {}", update.active);
                Ok(())
            }
            EnrichmentCommand::Remove { names } => {
                let update = update_enrichments(project_root, &names[..], false)?;
                if !update.changed.is_empty() {
                    println!("{} Disabled: {}", "✓".green(), join(&update.changed).cyan());
                }
                if !update.unchanged.is_empty() {
                    println!("Not enabled: {}", join(&update.unchanged));
                }
                println!("Active enrichments: {}", update.active);
                Ok(())
            }
            EnrichmentCommand::Check { experiment, sample } => check(project_root, experiment, sample).await,
        }
    }
}

fn list(project_root: &Path) -> Result<()> {
    let active = load_settings(project_root)?
        .map(|s| s.enrichments())
        .unwrap_or_default();

    println!("{}", "Available enrichments".bright_blue().bold());
    for enrichment in Enrichment::ALL {
        let marker = if active.contains(enrichment) {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("  {} {:<8} {}", marker, enrichment.name(), enrichment.description());
    }
    println!("\nActive: {}", active);
    Ok(())
}

fn info(name: &str) -> Result<()> {
    let enrichment: Enrichment = name.parse()?;
    println!("{}", enrichment.name().bright_blue().bold());
    println!("{}", enrichment.description());
    println!("\nTags:");
    for tag in enrichment.tags() {
        println!("  {}", tag);
    }
    Ok(())
}

async fn check(project_root: &Path, experiment: Option<String>, sample: usize) -> Result<()> {
    let (config, experiment) = resolve_experiment(project_root, experiment)?;
    let local = load_settings(project_root)?
        .map(|s| s.enrichments())
        .unwrap_or_default();

    let backend = LazyClient::new(config.target.clone());
    let pb = spinner(format!("Inspecting recent traces in {}...", experiment));
    let result = check_consistency(&backend, &experiment, &local, sample).await;
    pb.finish_and_clear();
    let advice = result?;

    println!("Traces inspected: {}", advice.sampled);
    println!("Detected:         {}", advice.detected);
    println!("Local:            {}", advice.local);

    if advice.sampled == 0 {
        println!("\nNo traces yet; nothing to compare.");
    } else if advice.is_consistent() {
        println!("\n{} Local enrichments match recent traces", "✓".green());
    } else {
        for line in advice.warnings() {
            warn(line);
        }
    }
    Ok(())
}
