// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `traces init`: wire MLflow tracing into a project.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use colored::Colorize;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{load_profiles, select_profile, TrackingTarget};
use crate::consistency::{check_consistency, EnrichmentAdvice, DEFAULT_SAMPLE_SIZE};
use crate::enrichment::EnrichmentSet;
use crate::error::{ConfigError, EnrichmentError, Result, TrackingError};
use crate::settings::{load_settings, save_settings, settings_path, ClaudeSettings};
use crate::tracking::{LazyClient, TrackingBackend};

use super::{spinner, warn};

/// Time allowed for the connection check.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Configure tracing for the current project
#[derive(Debug, Clone, Default, Args)]
pub struct InitArgs {
    /// Databricks CLI profile (defaults to DEFAULT, or the only profile)
    #[arg(long, conflicts_with = "local")]
    pub profile: Option<String>,

    /// Store traces in a local MLflow store instead of Databricks
    #[arg(long)]
    pub local: bool,

    /// Experiment name (defaults to the project directory name)
    #[arg(short, long)]
    pub experiment: Option<String>,

    /// Put the experiment in your personal workspace folder
    #[arg(long, conflicts_with = "local")]
    pub personal: bool,

    /// Workspace user for --personal (looked up when omitted)
    #[arg(long, requires = "personal")]
    pub user: Option<String>,

    /// MLflow server URI for --local, e.g. http://127.0.0.1:5000
    #[arg(long, requires = "local")]
    pub tracking_uri: Option<String>,

    /// Write settings without contacting the tracking service
    #[arg(long)]
    pub skip_verify: bool,

    /// Enable the enrichments already used by the experiment's recent traces
    #[arg(long)]
    pub match_enrichments: bool,
}

/// Workspace folder holding a Databricks experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentLocation {
    /// `/Workspace/Shared`, visible to all workspace users.
    Shared,
    /// `/Workspace/Users/<user>`, visible to one user.
    Personal(String),
}

/// Full workspace path for an experiment name.
///
/// Names that already are absolute paths are kept as given.
pub fn experiment_path(name: &str, location: &ExperimentLocation) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    match location {
        ExperimentLocation::Shared => format!("/Workspace/Shared/{}", name),
        ExperimentLocation::Personal(user) => format!("/Workspace/Users/{}/{}", user, name),
    }
}

/// Default experiment name: the project directory name.
pub fn default_experiment_name(project_root: &Path) -> Option<String> {
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Merge tracing into the project's settings file and save it.
pub fn write_tracing_settings(
    project_root: &Path,
    target: &TrackingTarget,
    experiment: &str,
    enrichments: &EnrichmentSet,
) -> Result<PathBuf> {
    let mut settings = load_settings(project_root)?.unwrap_or_else(ClaudeSettings::default);
    settings.apply_tracing(target, experiment);
    if !enrichments.is_empty() {
        let location = settings_path(project_root).display().to_string();
        settings.set_enrichments(enrichments, &location)?;
    }
    Ok(save_settings(project_root, &settings)?)
}

impl InitArgs {
    fn target(&self) -> Result<TrackingTarget> {
        if self.local {
            return match &self.tracking_uri {
                Some(uri) if uri.starts_with("http://") || uri.starts_with("https://") => {
                    Ok(TrackingTarget::Server {
                        uri: uri.trim_end_matches('/').to_string(),
                    })
                }
                Some(uri) => Err(ConfigError::InvalidValue {
                    field: "--tracking-uri".to_string(),
                    message: format!("'{}' is not an http(s) URL", uri),
                }
                .into()),
                None => Ok(TrackingTarget::LocalFiles),
            };
        }

        let profiles = load_profiles()?;
        let profile = select_profile(&profiles, self.profile.as_deref())?;
        if let Some(host) = profile.normalized_host() {
            println!("Using profile {} ({})", profile.name.cyan(), host);
        }
        Ok(TrackingTarget::Databricks {
            profile: profile.name,
        })
    }

    async fn resolve_experiment(
        &self,
        name: &str,
        target: &TrackingTarget,
        backend: &dyn TrackingBackend,
    ) -> Result<String> {
        if !matches!(target, TrackingTarget::Databricks { .. }) {
            return Ok(name.to_string());
        }
        let location = if self.personal {
            let user = match &self.user {
                Some(user) => user.clone(),
                None if self.skip_verify => bail!("--personal with --skip-verify needs --user"),
                None => timeout(VERIFY_TIMEOUT, backend.current_user())
                    .await
                    .map_err(|_| TrackingError::Timeout(VERIFY_TIMEOUT.as_millis() as u64))
                    .and_then(|r| r)
                    .context("Could not look up the workspace user; pass --user")?
                    .context("The workspace did not report a user name; pass --user")?,
            };
            ExperimentLocation::Personal(user)
        } else {
            ExperimentLocation::Shared
        };
        Ok(experiment_path(name, &location))
    }

    /// Check that the backend answers for this experiment.
    async fn verify(&self, target: &TrackingTarget, backend: &dyn TrackingBackend, experiment: &str) -> Result<()> {
        let pb = spinner(format!("Verifying connection to {}...", target.describe()));
        let result = timeout(VERIFY_TIMEOUT, backend.get_experiment_by_name(experiment)).await;
        pb.finish_and_clear();

        match result {
            Ok(Ok(found)) => {
                println!("{} Connection verified", "✓".green());
                if found.is_none() {
                    println!("  Experiment {} will be created by the first trace", experiment.cyan());
                }
                Ok(())
            }
            Ok(Err(e)) => {
                let hint = match target.profile() {
                    Some(profile) if e.is_auth() => format!(
                        "\n\nRe-authenticate with:\n  databricks auth login --profile {}\nThen run 'traces init' again.",
                        profile
                    ),
                    _ => String::new(),
                };
                bail!("Could not connect to {}: {}{}", target.describe(), e, hint)
            }
            Err(_) => bail!(
                "Could not connect to {}: {}",
                target.describe(),
                TrackingError::Timeout(VERIFY_TIMEOUT.as_millis() as u64)
            ),
        }
    }

    /// Compare with recent traces; never fails setup.
    async fn advise(&self, backend: &dyn TrackingBackend, experiment: &str) -> Option<EnrichmentAdvice> {
        let pb = spinner("Checking existing traces for enrichments...");
        let result = check_consistency(backend, experiment, &EnrichmentSet::new(), DEFAULT_SAMPLE_SIZE).await;
        pb.finish_and_clear();

        match result {
            Ok(advice) => Some(advice),
            Err(TrackingError::ExperimentNotFound(_)) => None,
            Err(e) => {
                debug!("Enrichment check failed: {}", e);
                println!("Could not detect existing enrichments; continuing with setup.");
                None
            }
        }
    }

    /// Pick the enrichments to write from the experiment's recent traces.
    ///
    /// Detected enrichments are adopted only with `--match-enrichments`.
    async fn choose_enrichments(&self, backend: &dyn TrackingBackend, experiment: &str) -> EnrichmentSet {
        let Some(advice) = self.advise(backend, experiment).await else {
            return EnrichmentSet::new();
        };
        if advice.detected.is_empty() {
            println!("No enrichments detected in existing traces.");
            EnrichmentSet::new()
        } else if self.match_enrichments {
            advice.detected
        } else {
            warn(format!(
                "Existing traces use enrichments: {}. Re-run with --match-enrichments \
                 or use 'traces enrichment add' to match them.",
                advice.detected
            ));
            EnrichmentSet::new()
        }
    }

    /// Execute the init command.
    pub async fn execute(self, project_root: &Path) -> Result<()> {
        let target = self.target()?;
        let backend = LazyClient::new(target.clone());
        self.run(project_root, target, &backend).await
    }

    async fn run(&self, project_root: &Path, target: TrackingTarget, backend: &dyn TrackingBackend) -> Result<()> {
        let name = match &self.experiment {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => bail!("Experiment name must not be empty"),
            None => default_experiment_name(project_root)
                .context("Cannot derive an experiment name from the project directory; pass --experiment")?,
        };

        if self.match_enrichments {
            if target == TrackingTarget::LocalFiles {
                return Err(EnrichmentError::LocalStore.into());
            }
            if self.skip_verify {
                warn("--match-enrichments has no effect with --skip-verify");
            }
        }

        let online = !self.skip_verify && target != TrackingTarget::LocalFiles;
        let experiment = self.resolve_experiment(&name, &target, backend).await?;

        let enrichments = if online {
            self.verify(&target, backend, &experiment).await?;
            self.choose_enrichments(backend, &experiment).await
        } else {
            EnrichmentSet::new()
        };

        let path = write_tracing_settings(project_root, &target, &experiment, &enrichments)?;
        let shown = path.strip_prefix(project_root).unwrap_or(&path);

        println!("{} Wrote {}", "✓".green(), shown.display());
        println!("  Experiment: {}", experiment.cyan());
        println!("  Tracking:   {}", target.describe());
        if !enrichments.is_empty() {
            println!("  Enrichments: {}", enrichments.to_string().cyan());
        }
        if target == TrackingTarget::LocalFiles {
            println!("  Traces will be stored locally in: mlruns/");
        }
        println!("\nSetup complete! Restart Claude Code to enable tracing.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::ENRICHMENTS_ENV;
    use crate::settings::{load_existing_settings, DEFAULT_HOOK_COMMAND, ENRICHED_HOOK_COMMAND};
    use crate::tracking::fake::{trace, with_tags, MemoryBackend};
    use tempfile::TempDir;

    #[test]
    fn test_experiment_path() {
        assert_eq!(
            experiment_path("proj", &ExperimentLocation::Shared),
            "/Workspace/Shared/proj"
        );
        assert_eq!(
            experiment_path("proj", &ExperimentLocation::Personal("a@b.com".to_string())),
            "/Workspace/Users/a@b.com/proj"
        );
        assert_eq!(
            experiment_path("/Workspace/Custom/x", &ExperimentLocation::Shared),
            "/Workspace/Custom/x"
        );
    }

    #[test]
    fn test_default_experiment_name() {
        assert_eq!(
            default_experiment_name(Path::new("/home/dev/my-project")).as_deref(),
            Some("my-project")
        );
        assert_eq!(default_experiment_name(Path::new("/")), None);
    }

    #[test]
    fn test_local_target() {
        let args = InitArgs {
            local: true,
            ..Default::default()
        };
        assert_eq!(args.target().unwrap(), TrackingTarget::LocalFiles);

        let args = InitArgs {
            local: true,
            tracking_uri: Some("http://127.0.0.1:5000/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            args.target().unwrap(),
            TrackingTarget::Server {
                uri: "http://127.0.0.1:5000".to_string()
            }
        );

        let args = InitArgs {
            local: true,
            tracking_uri: Some("mlruns".to_string()),
            ..Default::default()
        };
        assert!(args.target().is_err());
    }

    #[tokio::test]
    async fn test_personal_experiment_uses_current_user() {
        let args = InitArgs {
            personal: true,
            ..Default::default()
        };
        let backend = MemoryBackend {
            user: Some("dev@example.com".to_string()),
            ..Default::default()
        };
        let target = TrackingTarget::Databricks {
            profile: "dev".to_string(),
        };
        let path = args.resolve_experiment("proj", &target, &backend).await.unwrap();
        assert_eq!(path, "/Workspace/Users/dev@example.com/proj");
    }

    #[tokio::test]
    async fn test_personal_experiment_without_user_fails() {
        let args = InitArgs {
            personal: true,
            ..Default::default()
        };
        let target = TrackingTarget::Databricks {
            profile: "dev".to_string(),
        };
        assert!(args
            .resolve_experiment("proj", &target, &MemoryBackend::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_personal_skip_verify_needs_user() {
        let args = InitArgs {
            personal: true,
            skip_verify: true,
            ..Default::default()
        };
        let backend = MemoryBackend {
            user: Some("dev@example.com".to_string()),
            ..Default::default()
        };
        let target = TrackingTarget::Databricks {
            profile: "dev".to_string(),
        };
        let err = args.resolve_experiment("proj", &target, &backend).await.unwrap_err();
        assert!(err.to_string().contains("--user"));

        let args = InitArgs {
            user: Some("me@example.com".to_string()),
            ..args
        };
        let path = args.resolve_experiment("proj", &target, &backend).await.unwrap();
        assert_eq!(path, "/Workspace/Users/me@example.com/proj");
    }

    #[tokio::test]
    async fn test_non_databricks_keeps_plain_name() {
        let args = InitArgs::default();
        let path = args
            .resolve_experiment("proj", &TrackingTarget::LocalFiles, &MemoryBackend::default())
            .await
            .unwrap();
        assert_eq!(path, "proj");
    }

    #[tokio::test]
    async fn test_verify_reports_auth_hint() {
        let args = InitArgs::default();
        let backend = MemoryBackend {
            fail_with_auth: true,
            ..Default::default()
        };
        let target = TrackingTarget::Databricks {
            profile: "dev".to_string(),
        };
        let err = args.verify(&target, &backend, "/Workspace/Shared/p").await.unwrap_err();
        assert!(err.to_string().contains("databricks auth login --profile dev"));
    }

    #[test]
    fn test_write_settings_with_matched_enrichments() {
        let temp = TempDir::new().unwrap();
        let target = TrackingTarget::Databricks {
            profile: "dev".to_string(),
        };
        let set = EnrichmentSet::parse("tokens,git").unwrap();
        write_tracing_settings(temp.path(), &target, "/Workspace/Shared/p", &set).unwrap();

        let settings = load_existing_settings(temp.path()).unwrap();
        assert_eq!(settings.env(ENRICHMENTS_ENV), Some("git,tokens"));
        assert_eq!(settings.tracing_hook_command(), Some(ENRICHED_HOOK_COMMAND));
    }

    #[tokio::test]
    async fn test_execute_local_skip_verify() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("demo");
        std::fs::create_dir(&root).unwrap();

        let args = InitArgs {
            local: true,
            ..Default::default()
        };
        args.execute(&root).await.unwrap();

        let settings = load_existing_settings(&root).unwrap();
        assert_eq!(settings.env(crate::config::EXPERIMENT_NAME_ENV), Some("demo"));
        assert!(settings.has_tracing_hook());
    }

    fn project(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("proj");
        std::fs::create_dir(&root).unwrap();
        root
    }

    fn databricks() -> TrackingTarget {
        TrackingTarget::Databricks {
            profile: "dev".to_string(),
        }
    }

    /// Experiment whose recent traces carry git and token tags.
    fn enriched_backend() -> MemoryBackend {
        let backend = MemoryBackend::with_experiment("7", "/Workspace/Shared/proj");
        backend.add_trace(with_tags(trace("a", "7", 100), &[("git.branch", "main")]));
        backend.add_trace(with_tags(trace("b", "7", 200), &[("tokens.total", "42")]));
        backend
    }

    #[tokio::test]
    async fn test_match_enrichments_adopts_detected() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let args = InitArgs {
            match_enrichments: true,
            ..Default::default()
        };
        args.run(&root, databricks(), &enriched_backend()).await.unwrap();

        let settings = load_existing_settings(&root).unwrap();
        assert_eq!(settings.env(crate::config::EXPERIMENT_NAME_ENV), Some("/Workspace/Shared/proj"));
        assert_eq!(settings.env(ENRICHMENTS_ENV), Some("git,tokens"));
        assert_eq!(settings.tracing_hook_command(), Some(ENRICHED_HOOK_COMMAND));
    }

    #[tokio::test]
    async fn test_detected_enrichments_not_adopted_without_flag() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        InitArgs::default()
            .run(&root, databricks(), &enriched_backend())
            .await
            .unwrap();

        let settings = load_existing_settings(&root).unwrap();
        assert_eq!(settings.env(ENRICHMENTS_ENV), None);
        assert_eq!(settings.tracing_hook_command(), Some(DEFAULT_HOOK_COMMAND));
    }

    #[tokio::test]
    async fn test_advice_auth_failure_keeps_setup_going() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let backend = MemoryBackend {
            fail_search_with_auth: true,
            ..enriched_backend()
        };
        let args = InitArgs {
            match_enrichments: true,
            ..Default::default()
        };
        args.run(&root, databricks(), &backend).await.unwrap();

        let settings = load_existing_settings(&root).unwrap();
        assert!(settings.has_tracing_hook());
        assert_eq!(settings.env(ENRICHMENTS_ENV), None);
    }

    #[tokio::test]
    async fn test_match_enrichments_rejects_local_store() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let args = InitArgs {
            local: true,
            match_enrichments: true,
            ..Default::default()
        };
        let err = args
            .run(&root, TrackingTarget::LocalFiles, &MemoryBackend::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnrichmentError>(),
            Some(EnrichmentError::LocalStore)
        ));
        assert!(!settings_path(&root).exists());
    }
}
