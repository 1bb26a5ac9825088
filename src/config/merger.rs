// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Tracking settings can come from three places. Precedence (highest to lowest):
//! 1. CLI options
//! 2. Process environment
//! 3. `environment` block of `.claude/settings.json`

use std::collections::HashMap;

use crate::enrichment::ENRICHMENTS_ENV;

use super::types::{
    is_truthy, ResolvedConfig, TrackingTarget, DATABRICKS_PROFILE_ENV, EXPERIMENT_NAME_ENV,
    TRACKING_URI_ENV, TRACING_ENABLED_ENV,
};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub experiment: Option<String>,
    pub profile: Option<String>,
    pub tracking_uri: Option<String>,
}

/// A flat view of environment-like key/value pairs.
pub type EnvMap = HashMap<String, String>;

/// Snapshot the relevant variables of the process environment.
pub fn process_env() -> EnvMap {
    [
        TRACING_ENABLED_ENV,
        EXPERIMENT_NAME_ENV,
        TRACKING_URI_ENV,
        DATABRICKS_PROFILE_ENV,
        ENRICHMENTS_ENV,
    ]
    .iter()
    .filter_map(|key| {
        std::env::var(key)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| (key.to_string(), v))
    })
    .collect()
}

/// Merge settings-file values, process environment and CLI options.
pub fn merge_config(settings_env: &EnvMap, process: &EnvMap, cli: CliOptions) -> ResolvedConfig {
    let lookup = |key: &str| -> Option<String> {
        let present = |map: &EnvMap| map.get(key).filter(|v| !v.trim().is_empty()).cloned();
        present(process).or_else(|| present(settings_env))
    };

    let profile = cli.profile.clone().or_else(|| lookup(DATABRICKS_PROFILE_ENV));
    let uri = cli.tracking_uri.clone().or_else(|| lookup(TRACKING_URI_ENV));

    let target = match (&cli.profile, uri) {
        (Some(profile), _) => TrackingTarget::Databricks {
            profile: profile.clone(),
        },
        (None, Some(uri)) => TrackingTarget::from_uri(&uri, profile.as_deref()),
        (None, None) => TrackingTarget::LocalFiles,
    };

    ResolvedConfig {
        target,
        experiment: cli.experiment.or_else(|| lookup(EXPERIMENT_NAME_ENV)),
        tracing_enabled: lookup(TRACING_ENABLED_ENV).is_some_and(|v| is_truthy(&v)),
        enrichments: lookup(ENRICHMENTS_ENV),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_empty_sources_default_to_local() {
        let config = merge_config(&EnvMap::new(), &EnvMap::new(), CliOptions::default());
        assert_eq!(config, ResolvedConfig::default());
    }

    #[test]
    fn test_settings_values_used() {
        let settings = env(&[
            (TRACING_ENABLED_ENV, "true"),
            (TRACKING_URI_ENV, "databricks://dev"),
            (EXPERIMENT_NAME_ENV, "/Workspace/Shared/proj"),
            (ENRICHMENTS_ENV, "git"),
        ]);
        let config = merge_config(&settings, &EnvMap::new(), CliOptions::default());
        assert!(config.tracing_enabled);
        assert_eq!(config.target.profile(), Some("dev"));
        assert_eq!(config.experiment.as_deref(), Some("/Workspace/Shared/proj"));
        assert_eq!(config.enrichments.as_deref(), Some("git"));
    }

    #[test]
    fn test_process_env_overrides_settings() {
        let settings = env(&[(EXPERIMENT_NAME_ENV, "from-settings")]);
        let process = env(&[(EXPERIMENT_NAME_ENV, "from-env")]);
        let config = merge_config(&settings, &process, CliOptions::default());
        assert_eq!(config.experiment.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_cli_overrides_everything() {
        let settings = env(&[
            (EXPERIMENT_NAME_ENV, "from-settings"),
            (TRACKING_URI_ENV, "http://localhost:5000"),
        ]);
        let process = env(&[(EXPERIMENT_NAME_ENV, "from-env")]);
        let cli = CliOptions {
            experiment: Some("from-cli".to_string()),
            profile: Some("prod".to_string()),
            tracking_uri: None,
        };
        let config = merge_config(&settings, &process, cli);
        assert_eq!(config.experiment.as_deref(), Some("from-cli"));
        assert_eq!(config.target.profile(), Some("prod"));
    }

    #[test]
    fn test_bare_databricks_uri_uses_profile_variable() {
        let settings = env(&[
            (TRACKING_URI_ENV, "databricks"),
            (DATABRICKS_PROFILE_ENV, "staging"),
        ]);
        let config = merge_config(&settings, &EnvMap::new(), CliOptions::default());
        assert_eq!(config.target.profile(), Some("staging"));
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = env(&[(EXPERIMENT_NAME_ENV, "kept")]);
        let process = env(&[(EXPERIMENT_NAME_ENV, "  ")]);
        let config = merge_config(&settings, &process, CliOptions::default());
        assert_eq!(config.experiment.as_deref(), Some("kept"));
    }
}
