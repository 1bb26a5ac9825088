// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace enrichments.
//!
//! An enrichment is an optional category of metadata attached to a trace as
//! tags once the trace has been created:
//!
//! - **git** - commit, branch, remote and repository name of the working copy
//! - **files** - files written or edited during the session
//! - **tokens** - token usage summed over the session transcript
//!
//! The per-project selection is persisted in `.claude/settings.json` as a
//! comma-separated list (see [`EnrichmentSet`]).

pub mod collect;
pub mod git;
pub mod transcript;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;

pub use collect::{collect_tags, EnrichmentContext};
pub use git::{get_git_metadata, get_recent_commits, CommitInfo, GitRunner, SystemGit};
pub use transcript::{extract_modified_files, extract_token_usage, TokenTotals};

/// Environment variable holding the active enrichments.
pub const ENRICHMENTS_ENV: &str = "CLAUDETRACING_ENRICHMENTS";

/// An optional metadata category attached to traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enrichment {
    Git,
    Files,
    Tokens,
}

impl Enrichment {
    /// All enrichments in canonical order.
    pub const ALL: [Enrichment; 3] = [Enrichment::Git, Enrichment::Files, Enrichment::Tokens];

    /// Name used on the command line and in settings.
    pub fn name(&self) -> &'static str {
        match self {
            Enrichment::Git => "git",
            Enrichment::Files => "files",
            Enrichment::Tokens => "tokens",
        }
    }

    /// One-line description.
    pub fn description(&self) -> &'static str {
        match self {
            Enrichment::Git => "Git commit, branch, remote and repository name of the project",
            Enrichment::Files => "Files created or edited by Write/Edit tool calls in the session",
            Enrichment::Tokens => "Input, output and cache token counts summed over the session",
        }
    }

    /// Tag namespace prefix, including the trailing dot.
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            Enrichment::Git => "git.",
            Enrichment::Files => "files.",
            Enrichment::Tokens => "tokens.",
        }
    }

    /// Tag keys this enrichment can produce.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Enrichment::Git => &["git.commit_id", "git.branch", "git.remote_url", "git.repo_name"],
            Enrichment::Files => &["files.modified"],
            Enrichment::Tokens => &[
                "tokens.input",
                "tokens.output",
                "tokens.cache_read",
                "tokens.cache_creation",
                "tokens.total",
            ],
        }
    }

    /// Find the enrichment owning a tag key, if any.
    pub fn for_tag(key: &str) -> Option<Enrichment> {
        Self::ALL.into_iter().find(|e| key.starts_with(e.tag_prefix()))
    }

    /// Comma-separated list of all valid names.
    pub fn valid_names() -> String {
        Self::ALL.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Enrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Enrichment {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "git" => Ok(Enrichment::Git),
            "files" => Ok(Enrichment::Files),
            "tokens" => Ok(Enrichment::Tokens),
            _ => Err(EnrichmentError::Unknown {
                name: s.trim().to_string(),
                valid: Self::valid_names(),
            }),
        }
    }
}

/// A set of enrichments, always iterated in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSet(BTreeSet<Enrichment>);

impl EnrichmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, failing on the first unknown name.
    pub fn parse(value: &str) -> Result<Self, EnrichmentError> {
        let mut set = Self::new();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            set.insert(part.parse()?);
        }
        Ok(set)
    }

    /// Parse a comma-separated list, skipping unknown names.
    pub fn parse_lenient(value: &str) -> Self {
        value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| match p.parse() {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!("Ignoring enrichment: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Insert an enrichment, returning false if it was already present.
    pub fn insert(&mut self, enrichment: Enrichment) -> bool {
        self.0.insert(enrichment)
    }

    /// Remove an enrichment, returning false if it was absent.
    pub fn remove(&mut self, enrichment: Enrichment) -> bool {
        self.0.remove(&enrichment)
    }

    pub fn contains(&self, enrichment: Enrichment) -> bool {
        self.0.contains(&enrichment)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Enrichment> + '_ {
        self.0.iter().copied()
    }

    /// Enrichments present here but not in `other`.
    pub fn difference(&self, other: &EnrichmentSet) -> EnrichmentSet {
        self.0.difference(&other.0).copied().collect()
    }

    /// Settings representation, e.g. `git,tokens`.
    pub fn to_env_value(&self) -> String {
        self.iter().map(|e| e.name()).collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for EnrichmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<_> = self.iter().map(|e| e.name()).collect();
        f.write_str(&names.join(", "))
    }
}

impl FromIterator<Enrichment> for EnrichmentSet {
    fn from_iter<I: IntoIterator<Item = Enrichment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse a list of names from the command line, failing on the first unknown one.
pub fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<Enrichment>, EnrichmentError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}
