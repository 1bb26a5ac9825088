// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Enrichment consistency across collaborators.
//!
//! Each developer picks enrichments locally, so traces in a shared
//! experiment can carry different tag sets. Nothing is enforced: the
//! enrichments in use are inferred from the tags on recent traces and
//! compared with the local selection.

use tracing::debug;

use crate::enrichment::{Enrichment, EnrichmentSet};
use crate::error::TrackingError;
use crate::tracking::{recent_traces, require_experiment, TraceInfo, TrackingBackend};

/// Number of recent traces inspected by default.
pub const DEFAULT_SAMPLE_SIZE: usize = 20;

/// Enrichments whose tags appear on any of the given traces.
pub fn detect_enrichments(traces: &[TraceInfo]) -> EnrichmentSet {
    traces
        .iter()
        .flat_map(|t| t.tags.iter())
        .filter_map(|kv| Enrichment::for_tag(&kv.key))
        .collect()
}

/// Outcome of comparing local enrichments with an experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentAdvice {
    /// Enrichments seen on recent traces.
    pub detected: EnrichmentSet,
    /// Enrichments selected in this project.
    pub local: EnrichmentSet,
    /// Number of traces inspected.
    pub sampled: usize,
}

impl EnrichmentAdvice {
    pub fn new(detected: EnrichmentSet, local: EnrichmentSet, sampled: usize) -> Self {
        Self {
            detected,
            local,
            sampled,
        }
    }

    /// True when there was nothing to compare against or the sets agree.
    pub fn is_consistent(&self) -> bool {
        self.sampled == 0 || self.detected == self.local
    }

    /// Used by others in the experiment but not enabled here.
    pub fn missing_locally(&self) -> EnrichmentSet {
        self.detected.difference(&self.local)
    }

    /// Enabled here but absent from recent traces.
    pub fn extra_locally(&self) -> EnrichmentSet {
        self.local.difference(&self.detected)
    }

    /// Human-readable warning lines, empty when consistent.
    pub fn warnings(&self) -> Vec<String> {
        if self.is_consistent() {
            return Vec::new();
        }
        let mut lines = Vec::new();
        let missing = self.missing_locally();
        if !missing.is_empty() {
            lines.push(format!(
                "Recent traces in this experiment use enrichments not enabled here: {}",
                missing
            ));
        }
        let extra = self.extra_locally();
        if !extra.is_empty() {
            lines.push(format!(
                "Enrichments enabled here are not seen on recent traces: {}",
                extra
            ));
        }
        lines
    }
}

/// Compare the local enrichment set with recent traces of an experiment.
pub async fn check_consistency(
    backend: &dyn TrackingBackend,
    experiment: &str,
    local: &EnrichmentSet,
    sample: usize,
) -> Result<EnrichmentAdvice, TrackingError> {
    let exp = require_experiment(backend, experiment).await?;
    let traces = recent_traces(backend, &exp.experiment_id, sample, None).await?;
    let detected = detect_enrichments(&traces);
    debug!(sampled = traces.len(), %detected, %local, "Checked enrichment consistency");
    Ok(EnrichmentAdvice::new(detected, local.clone(), traces.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::fake::{trace, with_tags, MemoryBackend};

    fn set(value: &str) -> EnrichmentSet {
        EnrichmentSet::parse(value).unwrap()
    }

    #[test]
    fn test_detect_from_tag_prefixes() {
        let traces = vec![
            with_tags(trace("a", "1", 1), &[("git.branch", "main"), ("mlflow.user", "x")]),
            with_tags(trace("b", "1", 2), &[("tokens.total", "10")]),
            trace("c", "1", 3),
        ];
        assert_eq!(detect_enrichments(&traces), set("git,tokens"));
    }

    #[test]
    fn test_detect_ignores_lookalike_tags() {
        let traces = vec![with_tags(trace("a", "1", 1), &[("gitlab.project", "x"), ("filesize", "3")])];
        assert!(detect_enrichments(&traces).is_empty());
    }

    #[test]
    fn test_advice_classification() {
        let advice = EnrichmentAdvice::new(set("git,files"), set("files,tokens"), 5);
        assert!(!advice.is_consistent());
        assert_eq!(advice.missing_locally(), set("git"));
        assert_eq!(advice.extra_locally(), set("tokens"));
        assert_eq!(advice.warnings().len(), 2);
    }

    #[test]
    fn test_advice_consistent() {
        let advice = EnrichmentAdvice::new(set("git"), set("git"), 3);
        assert!(advice.is_consistent());
        assert!(advice.warnings().is_empty());
    }

    #[test]
    fn test_empty_experiment_is_consistent() {
        let advice = EnrichmentAdvice::new(EnrichmentSet::new(), set("git"), 0);
        assert!(advice.is_consistent());
    }

    #[tokio::test]
    async fn test_check_consistency_against_backend() {
        let backend = MemoryBackend::with_experiment("7", "/Workspace/Shared/proj");
        backend.add_trace(with_tags(trace("old", "7", 100), &[("files.modified", "[]")]));
        backend.add_trace(with_tags(trace("new", "7", 200), &[("git.commit_id", "abc")]));

        let advice = check_consistency(&backend, "/Workspace/Shared/proj", &set("git"), 1)
            .await
            .unwrap();
        assert_eq!(advice.sampled, 1);
        assert_eq!(advice.detected, set("git"));
        assert!(advice.is_consistent());
    }

    #[tokio::test]
    async fn test_check_consistency_missing_experiment() {
        let backend = MemoryBackend::default();
        let err = check_consistency(&backend, "nope", &EnrichmentSet::new(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::ExperimentNotFound(_)));
    }
}
