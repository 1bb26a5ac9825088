// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claude Code project settings.
//!
//! Tracing is wired into a project through `.claude/settings.json`: a set
//! of environment variables read by the MLflow hook and a `Stop` hook entry
//! that creates the trace when a session ends.

mod types;

pub use types::{
    is_tracing_command, ClaudeSettings, HookBlock, HookCommand, Hooks, DEFAULT_HOOK_COMMAND,
    ENRICHED_HOOK_COMMAND,
};

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SettingsError;

/// Claude Code project directory.
pub const CLAUDE_DIR: &str = ".claude";

/// Settings file inside [`CLAUDE_DIR`].
pub const SETTINGS_FILE: &str = "settings.json";

/// Directory for hook logs inside [`CLAUDE_DIR`].
pub const MLFLOW_LOG_DIR: &str = "mlflow";

/// Hook log file inside [`MLFLOW_LOG_DIR`].
pub const HOOK_LOG_FILE: &str = "claude_tracing.log";

/// Path of the settings file for a project.
pub fn settings_path(project_root: &Path) -> PathBuf {
    project_root.join(CLAUDE_DIR).join(SETTINGS_FILE)
}

/// Path of the hook log file for a project.
pub fn hook_log_path(project_root: &Path) -> PathBuf {
    project_root
        .join(CLAUDE_DIR)
        .join(MLFLOW_LOG_DIR)
        .join(HOOK_LOG_FILE)
}

/// Load project settings. A missing file is `Ok(None)`.
pub fn load_settings(project_root: &Path) -> Result<Option<ClaudeSettings>, SettingsError> {
    let path = settings_path(project_root);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(Some(ClaudeSettings::default()));
    }

    let value: serde_json::Value = serde_json::from_str(&content)?;
    if !value.is_object() {
        return Err(SettingsError::InvalidFormat(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| SettingsError::InvalidFormat(format!("{}: {}", path.display(), e)))
}

/// Load project settings, failing when the file does not exist.
pub fn load_existing_settings(project_root: &Path) -> Result<ClaudeSettings, SettingsError> {
    load_settings(project_root)?
        .ok_or_else(|| SettingsError::NotInitialized(settings_path(project_root).display().to_string()))
}

/// Write project settings, creating `.claude/` as needed.
///
/// The file is written to a sibling temp file first and renamed into place.
pub fn save_settings(project_root: &Path, settings: &ClaudeSettings) -> Result<PathBuf, SettingsError> {
    let path = settings_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut content = serde_json::to_string_pretty(settings)?;
    content.push('\n');

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;

    debug!(path = %path.display(), "Saved settings");
    Ok(path)
}
