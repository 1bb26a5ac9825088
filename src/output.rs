// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rendering of traces for `list` and `search`.

use std::fmt::Write;

use serde_json::{json, Value};

use crate::enrichment::{CommitInfo, Enrichment};
use crate::tracking::{TraceInfo, INPUTS_METADATA_KEY, OUTPUTS_METADATA_KEY};

/// Maximum characters of a request or response preview.
pub const PREVIEW_CHARS: usize = 500;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local repository state shown above a context digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSummary {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub recent_commits: Vec<CommitInfo>,
}

impl RepoSummary {
    pub fn is_empty(&self) -> bool {
        self.branch.is_none() && self.commit.is_none() && self.recent_commits.is_empty()
    }
}

/// Human-readable duration: `850ms`, `1.2s`, `2m 05s`.
pub fn format_duration(ms: i64) -> String {
    if ms < 1000 {
        format!("{}ms", ms.max(0))
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Shorten text to `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

fn started(trace: &TraceInfo) -> String {
    trace
        .started_at()
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn duration(trace: &TraceInfo) -> String {
    trace
        .execution_time_ms
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string())
}

/// Fixed-width table of traces.
pub fn format_trace_table(traces: &[TraceInfo]) -> String {
    if traces.is_empty() {
        return "No traces found.".to_string();
    }

    let id_width = traces
        .iter()
        .map(|t| t.request_id.len())
        .max()
        .unwrap_or(0)
        .max("TRACE ID".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<19}  {:<11}  {:>9}  {}",
        "TRACE ID", "STARTED", "STATUS", "DURATION", "SESSION"
    );
    for trace in traces {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<19}  {:<11}  {:>9}  {}",
            trace.request_id,
            started(trace),
            trace.status.to_string(),
            duration(trace),
            trace.session_id().unwrap_or("-"),
        );
    }
    out.trim_end().to_string()
}

/// Traces as a pretty JSON array.
pub fn format_traces_json(traces: &[TraceInfo]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(traces)
}

/// Trace summaries as JSON objects with flattened tags.
pub fn traces_summary_json(traces: &[TraceInfo]) -> Value {
    Value::Array(
        traces
            .iter()
            .map(|t| {
                json!({
                    "request_id": t.request_id,
                    "timestamp": t.started_at().map(|s| s.to_rfc3339()),
                    "status": t.status.to_string(),
                    "execution_time_ms": t.execution_time_ms,
                    "session_id": t.session_id(),
                    "tags": t.tag_map(),
                })
            })
            .collect(),
    )
}

/// Plain-text digest of traces, suited to pasting into a prompt.
pub fn format_context(traces: &[TraceInfo], repo: Option<&RepoSummary>) -> String {
    let mut out = String::new();

    if let Some(repo) = repo.filter(|r| !r.is_empty()) {
        let _ = writeln!(out, "## Repository");
        if let Some(branch) = &repo.branch {
            let _ = writeln!(out, "Branch: {}", branch);
        }
        if let Some(commit) = &repo.commit {
            let _ = writeln!(out, "Commit: {}", commit);
        }
        if !repo.recent_commits.is_empty() {
            let _ = writeln!(out, "Recent commits:");
            for c in &repo.recent_commits {
                let _ = writeln!(out, "  {} {} ({}, {})", c.short_hash, c.subject, c.author, c.date);
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Traces ({})", traces.len());
    for trace in traces {
        let _ = writeln!(out);
        let _ = writeln!(out, "### {}", trace.request_id);
        let _ = writeln!(
            out,
            "Started: {} | Status: {} | Duration: {}",
            started(trace),
            trace.status,
            duration(trace)
        );
        if let Some(session) = trace.session_id() {
            let _ = writeln!(out, "Session: {}", session);
        }

        let enrichment_tags: Vec<_> = trace
            .tag_map()
            .into_iter()
            .filter(|(k, _)| Enrichment::for_tag(k).is_some())
            .collect();
        for (key, value) in enrichment_tags {
            let _ = writeln!(out, "{}: {}", key, value);
        }

        if let Some(request) = trace.metadata(INPUTS_METADATA_KEY) {
            let _ = writeln!(out, "Request: {}", truncate(request, PREVIEW_CHARS));
        }
        if let Some(response) = trace.metadata(OUTPUTS_METADATA_KEY) {
            let _ = writeln!(out, "Response: {}", truncate(response, PREVIEW_CHARS));
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::fake::{trace, with_session, with_tags};
    use crate::tracking::KeyValue;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(850), "850ms");
        assert_eq!(format_duration(1234), "1.2s");
        assert_eq!(format_duration(125_000), "2m 05s");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 2), "éé...");
    }

    #[test]
    fn test_table_empty() {
        assert_eq!(format_trace_table(&[]), "No traces found.");
    }

    #[test]
    fn test_table_rows() {
        let traces = vec![
            with_session(trace("tr-abc", "1", 1_700_000_000_000), "sess-1"),
            trace("tr-def", "1", 1_700_000_060_000),
        ];
        let table = format_trace_table(&traces);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TRACE ID"));
        assert!(lines[1].contains("tr-abc"));
        assert!(lines[1].contains("2023-11-14 22:13:20"));
        assert!(lines[1].contains("OK"));
        assert!(lines[1].contains("1.2s"));
        assert!(lines[1].ends_with("sess-1"));
        assert!(lines[2].ends_with('-'));
    }

    #[test]
    fn test_summary_json() {
        let traces = vec![with_tags(trace("tr-1", "1", 0), &[("git.branch", "main")])];
        let value = traces_summary_json(&traces);
        assert_eq!(value[0]["request_id"], "tr-1");
        assert_eq!(value[0]["tags"]["git.branch"], "main");
        assert_eq!(value[0]["status"], "OK");
    }

    #[test]
    fn test_context_digest() {
        let mut t = with_tags(
            with_session(trace("tr-1", "1", 1_700_000_000_000), "sess-1"),
            &[("git.branch", "main"), ("mlflow.user", "someone"), ("tokens.total", "42")],
        );
        t.request_metadata.push(KeyValue {
            key: INPUTS_METADATA_KEY.to_string(),
            value: "x".repeat(600),
        });
        t.request_metadata.push(KeyValue {
            key: OUTPUTS_METADATA_KEY.to_string(),
            value: "done".to_string(),
        });

        let repo = RepoSummary {
            branch: Some("main".to_string()),
            commit: Some("abc123".to_string()),
            recent_commits: vec![CommitInfo {
                hash: "abc123".to_string(),
                short_hash: "abc".to_string(),
                author: "Dev".to_string(),
                date: "2024-01-01T00:00:00Z".to_string(),
                subject: "Fix parser".to_string(),
            }],
        };

        let text = format_context(&[t], Some(&repo));
        assert!(text.starts_with("## Repository"));
        assert!(text.contains("Branch: main"));
        assert!(text.contains("  abc Fix parser (Dev, 2024-01-01T00:00:00Z)"));
        assert!(text.contains("## Traces (1)"));
        assert!(text.contains("Session: sess-1"));
        assert!(text.contains("git.branch: main"));
        assert!(text.contains("tokens.total: 42"));
        assert!(!text.contains("mlflow.user"));
        assert!(text.contains(&format!("Request: {}...", "x".repeat(PREVIEW_CHARS))));
        assert!(text.ends_with("Response: done"));
    }

    #[test]
    fn test_context_without_repo() {
        let text = format_context(&[], Some(&RepoSummary::default()));
        assert_eq!(text, "## Traces (0)");
    }
}
