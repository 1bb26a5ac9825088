// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module.
//!
//! Handles resolving where traces go from multiple sources:
//! - Databricks CLI profiles: ~/.databrickscfg
//! - Project settings: the `environment` block of .claude/settings.json
//! - Process environment: MLFLOW_* and DATABRICKS_* variables
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > environment > settings > defaults).

mod loader;
mod merger;
mod types;

// Re-export public types
pub use loader::{
    get_databricks_config_path, load_profiles, load_profiles_from, parse_databricks_config,
    select_profile, DATABRICKS_CONFIG_FILE,
};

pub use merger::{merge_config, process_env, CliOptions, EnvMap};

pub use types::{
    is_truthy, normalize_host, DatabricksProfile, ResolvedConfig, TrackingTarget,
    DATABRICKS_CONFIG_FILE_ENV, DATABRICKS_PROFILE_ENV, DATABRICKS_TOKEN_ENV, DEFAULT_PROFILE,
    EXPERIMENT_NAME_ENV, TRACING_ENABLED_ENV, TRACKING_URI_ENV,
};

use crate::error::ConfigError;
use crate::settings::load_settings;
use std::path::Path;

/// Load and merge all configuration sources for a project.
///
/// This is the main entry point for configuration loading.
pub fn load_config(project_root: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let settings_env = load_settings(project_root)?
        .map(|s| s.env_map())
        .unwrap_or_default();

    Ok(merge_config(&settings_env, &process_env(), cli_options))
}
