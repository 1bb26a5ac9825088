// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claude Code transcript parsing for the `files` and `tokens` enrichments.
//!
//! Transcripts are JSONL: one JSON object per line. Blank and malformed
//! lines are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::error::EnrichmentError;

/// Tool calls that modify a file.
pub const FILE_MODIFYING_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit"];

/// Read a token count, treating missing or off-type values as zero.
fn count(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Token counts summed over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_creation: u64,
}

impl TokenTotals {
    /// Input plus output tokens.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }

    /// Counts from one `usage` object.
    fn from_usage(usage: &Value) -> Self {
        Self {
            input: count(usage, "input_tokens"),
            output: count(usage, "output_tokens"),
            cache_read: count(usage, "cache_read_input_tokens"),
            cache_creation: count(usage, "cache_creation_input_tokens"),
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn add(&mut self, other: &TokenTotals) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_creation += other.cache_creation;
    }

    /// `tokens.*` tags, omitting zero counts.
    pub fn to_tags(&self) -> BTreeMap<String, String> {
        [
            ("tokens.input", self.input),
            ("tokens.output", self.output),
            ("tokens.cache_read", self.cache_read),
            ("tokens.cache_creation", self.cache_creation),
            ("tokens.total", self.total()),
        ]
        .into_iter()
        .filter(|(_, v)| *v > 0)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

fn read_entries(path: &Path) -> Result<Vec<Value>, EnrichmentError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EnrichmentError::Transcript(format!("failed to read {}: {}", path.display(), e))
    })?;

    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(entry) if entry.is_object() => entries.push(entry),
            Ok(_) => tracing::debug!(line = idx + 1, "Skipping non-object transcript line"),
            Err(e) => tracing::debug!(line = idx + 1, error = %e, "Skipping malformed transcript line"),
        }
    }
    Ok(entries)
}

/// Collect file paths touched by Write/Edit tool calls.
pub fn extract_modified_files(path: &Path) -> Result<BTreeSet<String>, EnrichmentError> {
    let mut modified = BTreeSet::new();

    for entry in read_entries(path)? {
        let Some(blocks) = entry
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                continue;
            }
            let name = block.get("name").and_then(Value::as_str).unwrap_or("");
            if !FILE_MODIFYING_TOOLS.contains(&name) {
                continue;
            }
            if let Some(file_path) = block
                .get("input")
                .and_then(|i| i.get("file_path"))
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
            {
                modified.insert(file_path.to_string());
            }
        }
    }

    Ok(modified)
}

/// Sum token usage across transcript entries.
///
/// Usage is read from the top-level `usage` field, falling back to `message.usage`.
pub fn extract_token_usage(path: &Path) -> Result<TokenTotals, EnrichmentError> {
    let mut totals = TokenTotals::default();

    for entry in read_entries(path)? {
        let top = entry
            .get("usage")
            .map(TokenTotals::from_usage)
            .filter(|u| !u.is_empty());
        let usage = top.or_else(|| {
            entry
                .get("message")
                .and_then(|m| m.get("usage"))
                .map(TokenTotals::from_usage)
        });
        if let Some(usage) = usage {
            totals.add(&usage);
        }
    }

    Ok(totals)
}

/// `files.modified` tag: a JSON array of sorted paths, absent when nothing changed.
pub fn files_tags(files: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if !files.is_empty() {
        let list: Vec<&String> = files.iter().collect();
        if let Ok(json) = serde_json::to_string(&list) {
            tags.insert("files.modified".to_string(), json);
        }
    }
    tags
}
