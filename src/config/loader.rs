// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Databricks profile loading.
//!
//! Reads the INI-style `~/.databrickscfg` written by the Databricks CLI.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{DatabricksProfile, DATABRICKS_CONFIG_FILE_ENV, DEFAULT_PROFILE};

/// Databricks config file name in the home directory.
pub const DATABRICKS_CONFIG_FILE: &str = ".databrickscfg";

/// Get the Databricks config file path.
///
/// `DATABRICKS_CONFIG_FILE` overrides the default `~/.databrickscfg`.
pub fn get_databricks_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(DATABRICKS_CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::home_dir().map(|home| home.join(DATABRICKS_CONFIG_FILE))
}

/// Load all profiles from the default config location.
pub fn load_profiles() -> Result<Vec<DatabricksProfile>, ConfigError> {
    match get_databricks_config_path() {
        Some(path) => load_profiles_from(&path),
        None => Ok(Vec::new()),
    }
}

/// Load all profiles from a config file. A missing file has no profiles.
pub fn load_profiles_from(path: &Path) -> Result<Vec<DatabricksProfile>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(parse_databricks_config(&content))
}

/// Parse the contents of a Databricks config file.
pub fn parse_databricks_config(content: &str) -> Vec<DatabricksProfile> {
    let mut profiles = Vec::new();
    let mut current: Option<DatabricksProfile> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(profile) = current.take() {
                profiles.push(profile);
            }
            current = Some(DatabricksProfile {
                name: line[1..line.len() - 1].trim().to_string(),
                ..Default::default()
            });
            continue;
        }

        let (Some(profile), Some((key, value))) = (current.as_mut(), line.split_once('=')) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "host" => profile.host = Some(value.to_string()),
            "token" => profile.token = Some(value.to_string()),
            "auth_type" => profile.auth_type = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(profile) = current {
        profiles.push(profile);
    }
    profiles
}

/// Pick a profile.
///
/// A requested name must exist. Otherwise `DEFAULT` wins, then a sole profile.
pub fn select_profile(
    profiles: &[DatabricksProfile],
    requested: Option<&str>,
) -> Result<DatabricksProfile, ConfigError> {
    let config_path = || {
        get_databricks_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| DATABRICKS_CONFIG_FILE.to_string())
    };

    if let Some(name) = requested {
        return profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()));
    }

    match profiles {
        [] => Err(ConfigError::NoProfiles(config_path())),
        [only] => Ok(only.clone()),
        many => many
            .iter()
            .find(|p| p.name == DEFAULT_PROFILE)
            .cloned()
            .ok_or_else(|| {
                ConfigError::AmbiguousProfile(
                    many.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "),
                )
            }),
    }
}
