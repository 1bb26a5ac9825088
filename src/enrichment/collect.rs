// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gather tags for a set of active enrichments.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, error};

use super::git::{get_git_metadata, GitRunner};
use super::transcript::{extract_modified_files, extract_token_usage, files_tags};
use super::{Enrichment, EnrichmentSet};

/// Inputs available to enrichment collectors at the end of a session.
pub struct EnrichmentContext<'a> {
    pub git: &'a dyn GitRunner,
    pub transcript_path: Option<PathBuf>,
}

/// Collect tags for every active enrichment.
///
/// A failing enrichment is logged and contributes no tags; the others still run.
pub async fn collect_tags(
    active: &EnrichmentSet,
    ctx: &EnrichmentContext<'_>,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();

    for enrichment in active.iter() {
        let collected = match enrichment {
            Enrichment::Git => {
                let meta = get_git_metadata(ctx.git).await;
                debug!(?meta, "Git enrichment");
                meta
            }
            Enrichment::Files => match &ctx.transcript_path {
                Some(path) => match extract_modified_files(path) {
                    Ok(files) => {
                        debug!(count = files.len(), "Files enrichment");
                        files_tags(&files)
                    }
                    Err(e) => {
                        error!("Failed to get files enrichment: {}", e);
                        BTreeMap::new()
                    }
                },
                None => BTreeMap::new(),
            },
            Enrichment::Tokens => match &ctx.transcript_path {
                Some(path) => match extract_token_usage(path) {
                    Ok(totals) => {
                        debug!(?totals, "Tokens enrichment");
                        totals.to_tags()
                    }
                    Err(e) => {
                        error!("Failed to get tokens enrichment: {}", e);
                        BTreeMap::new()
                    }
                },
                None => BTreeMap::new(),
            },
        };
        tags.extend(collected);
    }

    tags
}
