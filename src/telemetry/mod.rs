// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging infrastructure.
//!
//! Interactive commands log to stderr; the Claude Code hook logs to
//! `.claude/mlflow/claude_tracing.log` because its stdout carries the
//! hook response.
//!
//! # Usage
//!
//! ```rust,ignore
//! use claude_tracing::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::for_verbosity(verbose, debug))?;
//! ```
//!
//! With the `telemetry` feature, tracking calls and the hook carry
//! `#[instrument]` spans.

mod init;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
