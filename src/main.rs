// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `traces` entry point.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use claude_tracing::cli::{EnrichmentArgs, HookArgs, InitArgs, ListArgs, SearchArgs};
use claude_tracing::settings::hook_log_path;
use claude_tracing::telemetry::{init_telemetry, TelemetryConfig};

/// Traces - MLflow tracing for Claude Code.
#[derive(Parser)]
#[command(name = "traces")]
#[command(author, version, about = "Set up MLflow tracing for Claude Code", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show trace logs (full payloads)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for traces.
#[derive(Subcommand)]
enum Commands {
    /// Configure tracing for the current project
    Init(InitArgs),

    /// List recent traces
    #[command(alias = "ls")]
    List(ListArgs),

    /// Search traces by time window or id
    Search(SearchArgs),

    /// Manage trace enrichments
    Enrichment(EnrichmentArgs),

    /// Hook handlers (called by Claude Code)
    #[command(hide = true)]
    Hook(HookArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let telemetry = match &cli.command {
        Commands::Hook(_) => TelemetryConfig::hook(hook_log_path(&project_root)),
        _ => TelemetryConfig::for_verbosity(cli.verbose, cli.debug),
    };
    // Logging is best-effort; a missing log directory must not break the hook.
    let _guard = init_telemetry(&telemetry).ok();

    let result = match cli.command {
        Commands::Init(args) => args.execute(&project_root).await,
        Commands::List(args) => args.execute(&project_root).await,
        Commands::Search(args) => args.execute(&project_root).await,
        Commands::Enrichment(args) => args.execute(&project_root).await,
        Commands::Hook(args) => {
            let code = args.execute(&project_root).await;
            return ExitCode::from(code.clamp(0, 255) as u8);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
