// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claude Tracing - MLflow tracing for Claude Code projects.
//!
//! Sets a project up so that every Claude Code session is recorded as an
//! MLflow trace in a Databricks workspace or a local MLflow store, and
//! optionally tags those traces with extra metadata ("enrichments").
//! Trace capture itself is delegated to MLflow's Claude Code hook.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`error`] - Error types and result aliases
//! - [`config`] - Databricks profiles and tracking configuration merging
//! - [`settings`] - `.claude/settings.json` reading, merging and writing
//! - [`enrichment`] - Enrichment registry and the git/transcript collectors
//! - [`tracking`] - MLflow REST client behind the [`tracking::TrackingBackend`] trait
//! - [`consistency`] - Advisory comparison of enrichments across collaborators
//! - [`hook`] - The enriched `Stop` hook
//! - [`output`] - Table, JSON and context rendering of traces
//! - [`cli`] - Command handlers for the `traces` binary
//! - [`telemetry`] - Logging setup
//!
//! # Example
//!
//! ```rust,ignore
//! use claude_tracing::config::TrackingTarget;
//! use claude_tracing::settings::{load_settings, save_settings};
//!
//! let mut settings = load_settings(root)?.unwrap_or_default();
//! settings.apply_tracing(&TrackingTarget::Databricks { profile: "DEFAULT".into() }, "/Workspace/Shared/proj");
//! save_settings(root, &settings)?;
//! ```

pub mod cli;
pub mod config;
pub mod consistency;
pub mod enrichment;
pub mod error;
pub mod hook;
pub mod output;
pub mod settings;
pub mod telemetry;
pub mod tracking;

// Re-export commonly used types at crate root
pub use config::{ResolvedConfig, TrackingTarget};
pub use enrichment::{Enrichment, EnrichmentSet};
pub use error::{ConfigError, EnrichmentError, Result, SettingsError, TrackingError};
pub use settings::ClaudeSettings;
pub use tracking::{MlflowClient, TraceInfo, TrackingBackend};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
