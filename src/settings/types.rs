// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claude Code settings file model.
//!
//! Only the parts this tool owns are typed; every other key is carried
//! through untouched in the flattened `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{
    merge_config, CliOptions, EnvMap, TrackingTarget, DATABRICKS_PROFILE_ENV, EXPERIMENT_NAME_ENV, TRACKING_URI_ENV,
    TRACING_ENABLED_ENV,
};
use crate::enrichment::{EnrichmentSet, ENRICHMENTS_ENV};
use crate::error::SettingsError;

/// Stop hook command that only creates the trace.
pub const DEFAULT_HOOK_COMMAND: &str = "uv run python -c \"from mlflow.claude_code.hooks import stop_hook_handler; stop_hook_handler()\"";

/// Stop hook command that creates the trace and applies enrichments.
pub const ENRICHED_HOOK_COMMAND: &str = "traces hook stop";

/// Substrings identifying a hook command as ours.
const TRACING_HOOK_MARKERS: &[&str] = &["mlflow", "claudetracing", "traces hook"];

/// Check whether a hook command belongs to trace capture.
pub fn is_tracing_command(command: &str) -> bool {
    TRACING_HOOK_MARKERS.iter().any(|m| command.contains(m))
}

/// `.claude/settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeSettings {
    /// Environment variables exported to hooks.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub environment: Map<String, Value>,

    /// Hook configuration keyed by lifecycle event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hooks keyed by event; only `Stop` is typed.
///
/// `stop` is `None` only when the file had no `Stop` key, so an explicit
/// empty list is written back as it was read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(rename = "Stop", default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<HookBlock>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A matcher block holding hook commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Vec<HookCommand>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookBlock {
    /// A block is kept when it still runs something.
    fn is_empty(&self) -> bool {
        let has_hooks = self.hooks.as_ref().is_some_and(|h| !h.is_empty());
        let has_command = self
            .extra
            .get("command")
            .and_then(Value::as_str)
            .is_some_and(|c| !c.is_empty());
        !has_hooks && !has_command
    }
}

/// A single hook entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookCommand {
    #[serde(rename = "type", default = "default_hook_type")]
    pub kind: String,

    #[serde(default)]
    pub command: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_hook_type() -> String {
    "command".to_string()
}

impl HookCommand {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: default_hook_type(),
            command: command.into(),
            extra: Map::new(),
        }
    }
}

impl ClaudeSettings {
    /// String value of an environment variable.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).and_then(Value::as_str)
    }

    pub fn set_env(&mut self, key: &str, value: impl Into<String>) {
        self.environment
            .insert(key.to_string(), Value::String(value.into()));
    }

    pub fn remove_env(&mut self, key: &str) -> Option<Value> {
        self.environment.shift_remove(key)
    }

    /// String-valued environment entries.
    pub fn env_map(&self) -> EnvMap {
        self.environment
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }

    /// Tracking target recorded in the settings file alone.
    pub fn tracking_target(&self) -> TrackingTarget {
        merge_config(&self.env_map(), &EnvMap::new(), CliOptions::default()).target
    }

    fn stop_hooks(&self) -> impl Iterator<Item = &HookCommand> + '_ {
        self.hooks
            .iter()
            .flat_map(|h| h.stop.iter().flatten())
            .flat_map(|b| b.hooks.iter().flatten())
    }

    /// Command of the installed tracing hook, if any.
    pub fn tracing_hook_command(&self) -> Option<&str> {
        self.stop_hooks()
            .find(|h| is_tracing_command(&h.command))
            .map(|h| h.command.as_str())
    }

    pub fn has_tracing_hook(&self) -> bool {
        self.tracing_hook_command().is_some()
    }

    /// Drop every tracing hook and any block left empty.
    fn remove_tracing_hooks(&mut self) {
        if let Some(stop) = self.hooks.as_mut().and_then(|h| h.stop.as_mut()) {
            for block in stop.iter_mut() {
                if let Some(commands) = block.hooks.as_mut() {
                    commands.retain(|h| !is_tracing_command(&h.command));
                }
            }
            stop.retain(|b| !b.is_empty());
        }
    }

    /// Add a hook to the first block that holds a hook list, or a new block.
    fn push_stop_hook(&mut self, hook: HookCommand) {
        let stop = self
            .hooks
            .get_or_insert_with(Hooks::default)
            .stop
            .get_or_insert_with(Vec::new);
        match stop.iter_mut().find_map(|b| b.hooks.as_mut()) {
            Some(commands) => commands.push(hook),
            None => stop.push(HookBlock {
                hooks: Some(vec![hook]),
                extra: Map::new(),
            }),
        }
    }

    /// Configure trace capture for an experiment.
    ///
    /// Tracing variables override existing ones, the enrichment selection is
    /// cleared, and exactly one default tracing hook remains.
    pub fn apply_tracing(&mut self, target: &TrackingTarget, experiment: &str) {
        self.set_env(TRACING_ENABLED_ENV, "true");
        self.set_env(EXPERIMENT_NAME_ENV, experiment);

        match target.tracking_uri() {
            Some(uri) => self.set_env(TRACKING_URI_ENV, uri),
            None => {
                self.remove_env(TRACKING_URI_ENV);
            }
        }
        match target.profile() {
            Some(profile) => self.set_env(DATABRICKS_PROFILE_ENV, profile),
            None => {
                self.remove_env(DATABRICKS_PROFILE_ENV);
            }
        }

        self.remove_env(ENRICHMENTS_ENV);

        self.remove_tracing_hooks();
        self.push_stop_hook(HookCommand::command(DEFAULT_HOOK_COMMAND));
    }

    /// Active enrichments. Unknown names are skipped.
    pub fn enrichments(&self) -> EnrichmentSet {
        self.env(ENRICHMENTS_ENV)
            .map(EnrichmentSet::parse_lenient)
            .unwrap_or_default()
    }

    /// Store an enrichment selection and switch the hook command to match.
    pub fn set_enrichments(
        &mut self,
        enrichments: &EnrichmentSet,
        location: &str,
    ) -> Result<(), SettingsError> {
        if !self.has_tracing_hook() {
            return Err(SettingsError::NotInitialized(location.to_string()));
        }

        if enrichments.is_empty() {
            self.remove_env(ENRICHMENTS_ENV);
        } else {
            self.set_env(ENRICHMENTS_ENV, enrichments.to_env_value());
        }

        let command = if enrichments.is_empty() {
            DEFAULT_HOOK_COMMAND
        } else {
            ENRICHED_HOOK_COMMAND
        };
        self.remove_tracing_hooks();
        self.push_stop_hook(HookCommand::command(command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::Enrichment;
    use serde_json::json;

    fn databricks() -> TrackingTarget {
        TrackingTarget::Databricks {
            profile: "dev".to_string(),
        }
    }

    fn from_json(value: Value) -> ClaudeSettings {
        serde_json::from_value(value).unwrap()
    }

    fn tracing_hook_count(settings: &ClaudeSettings) -> usize {
        settings
            .stop_hooks()
            .filter(|h| is_tracing_command(&h.command))
            .count()
    }

    #[test]
    fn test_apply_tracing_fresh() {
        let mut settings = ClaudeSettings::default();
        settings.apply_tracing(&databricks(), "/Workspace/Shared/proj");

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["environment"][TRACING_ENABLED_ENV], "true");
        assert_eq!(value["environment"][TRACKING_URI_ENV], "databricks://dev");
        assert_eq!(value["environment"][EXPERIMENT_NAME_ENV], "/Workspace/Shared/proj");
        assert_eq!(value["environment"][DATABRICKS_PROFILE_ENV], "dev");
        assert_eq!(
            value["hooks"]["Stop"],
            json!([{"hooks": [{"type": "command", "command": DEFAULT_HOOK_COMMAND}]}])
        );
    }

    #[test]
    fn test_apply_tracing_local_drops_remote_vars() {
        let mut settings = ClaudeSettings::default();
        settings.apply_tracing(&databricks(), "exp");
        settings.apply_tracing(&TrackingTarget::LocalFiles, "exp");
        assert!(settings.env(TRACKING_URI_ENV).is_none());
        assert!(settings.env(DATABRICKS_PROFILE_ENV).is_none());
        assert_eq!(settings.env(EXPERIMENT_NAME_ENV), Some("exp"));
    }

    #[test]
    fn test_apply_tracing_preserves_other_settings() {
        let mut settings = from_json(json!({
            "permissions": {"allow": ["Bash(ls)"]},
            "environment": {"MY_VAR": "1", "MLFLOW_EXPERIMENT_NAME": "old"},
            "hooks": {
                "PreToolUse": [{"matcher": "Bash", "hooks": [{"type": "command", "command": "lint"}]}],
                "Stop": [{"hooks": [{"type": "command", "command": "notify-send done"}]}]
            }
        }));
        settings.apply_tracing(&databricks(), "new");

        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["permissions"]["allow"][0], "Bash(ls)");
        assert_eq!(value["environment"]["MY_VAR"], "1");
        assert_eq!(value["environment"][EXPERIMENT_NAME_ENV], "new");
        assert_eq!(value["hooks"]["PreToolUse"][0]["matcher"], "Bash");

        let stop = value["hooks"]["Stop"].as_array().unwrap();
        assert_eq!(stop.len(), 1);
        let commands = stop[0]["hooks"].as_array().unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0]["command"], "notify-send done");
        assert_eq!(commands[1]["command"], DEFAULT_HOOK_COMMAND);
    }

    #[test]
    fn test_apply_tracing_replaces_old_hooks_and_empty_blocks() {
        let mut settings = from_json(json!({
            "environment": {"CLAUDETRACING_ENRICHMENTS": "git"},
            "hooks": {"Stop": [
                {"hooks": [{"type": "command", "command": "python -m claudetracing.hooks"}]},
                {"hooks": [{"type": "command", "command": "uv run mlflow something"}]},
                {"command": "legacy-direct-command"}
            ]}
        }));
        settings.apply_tracing(&databricks(), "exp");

        assert!(settings.env(ENRICHMENTS_ENV).is_none());
        assert_eq!(tracing_hook_count(&settings), 1);

        let stop = settings.hooks.as_ref().unwrap().stop.as_ref().unwrap();
        assert_eq!(stop.len(), 2);
        assert_eq!(stop[0].extra["command"], "legacy-direct-command");
        assert_eq!(settings.tracing_hook_command(), Some(DEFAULT_HOOK_COMMAND));
    }

    #[test]
    fn test_apply_tracing_is_idempotent() {
        let mut once = ClaudeSettings::default();
        once.apply_tracing(&databricks(), "exp");
        let mut twice = once.clone();
        twice.apply_tracing(&databricks(), "exp");
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn test_set_enrichments_requires_tracing() {
        let mut settings = ClaudeSettings::default();
        let set: EnrichmentSet = [Enrichment::Git].into_iter().collect();
        let err = settings.set_enrichments(&set, ".claude/settings.json").unwrap_err();
        assert!(matches!(err, SettingsError::NotInitialized(_)));
    }

    #[test]
    fn test_set_enrichments_swaps_hook() {
        let mut settings = ClaudeSettings::default();
        settings.apply_tracing(&databricks(), "exp");

        let set: EnrichmentSet = [Enrichment::Tokens, Enrichment::Git].into_iter().collect();
        settings.set_enrichments(&set, "settings").unwrap();
        assert_eq!(settings.env(ENRICHMENTS_ENV), Some("git,tokens"));
        assert_eq!(settings.tracing_hook_command(), Some(ENRICHED_HOOK_COMMAND));
        assert_eq!(settings.enrichments(), set);
        assert_eq!(tracing_hook_count(&settings), 1);

        settings.set_enrichments(&EnrichmentSet::new(), "settings").unwrap();
        assert!(settings.env(ENRICHMENTS_ENV).is_none());
        assert_eq!(settings.tracing_hook_command(), Some(DEFAULT_HOOK_COMMAND));
        assert_eq!(tracing_hook_count(&settings), 1);
    }

    #[test]
    fn test_enrichments_lenient_parse() {
        let settings = from_json(json!({"environment": {"CLAUDETRACING_ENRICHMENTS": "files,unknown"}}));
        assert_eq!(settings.enrichments().to_env_value(), "files");
    }

    #[test]
    fn test_env_map_skips_non_strings() {
        let settings = from_json(json!({"environment": {"A": "x", "B": 3}}));
        let env = settings.env_map();
        assert_eq!(env.get("A").map(String::as_str), Some("x"));
        assert!(!env.contains_key("B"));
    }

    #[test]
    fn test_is_tracing_command() {
        assert!(is_tracing_command(DEFAULT_HOOK_COMMAND));
        assert!(is_tracing_command(ENRICHED_HOOK_COMMAND));
        assert!(is_tracing_command("python -c 'import claudetracing'"));
        assert!(!is_tracing_command("say done"));
    }
}
