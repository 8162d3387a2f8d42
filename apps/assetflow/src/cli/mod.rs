//! # assetflow CLI Module
//!
//! This module implements the CLI interface for assetflow.
//!
//! ## Available Commands
//!
//! - `graph` - List assets by level, or show one asset
//! - `execution-set` - Show what must run together with an asset
//! - `same-run` - Check whether a child and parent can share a run
//! - `tick` - Evaluate automation conditions and plan runs
//! - `state` - Inspect, prune or compact stored evaluation state

mod commands;

use assetflow_core::AssetFlowError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// assetflow - asset graph and declarative automation
///
/// Builds the asset graph declared by a project file and decides, tick by
/// tick, which assets should be materialized.
#[derive(Parser, Debug)]
#[command(name = "assetflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the project file
    #[arg(short = 'c', long, global = true, default_value = "assetflow.toml")]
    pub config: PathBuf,

    /// Path to the state database (overrides the project setting)
    #[arg(short = 'S', long, global = true)]
    pub state: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List assets by topological level, or show one asset
    Graph {
        /// Asset key (`a/b/c`) to describe
        #[arg(short, long)]
        asset: Option<String>,
    },

    /// Show the execution set of an asset
    ExecutionSet {
        /// Asset key
        asset: String,
    },

    /// Check whether a child and one of its parents can run together
    SameRun {
        /// Child asset key
        child: String,

        /// Parent asset key
        parent: String,
    },

    /// Evaluate one tick
    Tick {
        /// JSON status file (materializations, in-progress and failed runs)
        #[arg(short, long)]
        status: Option<PathBuf>,

        /// Evaluation time (RFC 3339), defaults to now
        #[arg(short, long)]
        now: Option<String>,

        /// Evaluate without committing state
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect stored evaluation state
    State {
        /// Asset key whose latest snapshot to show
        #[arg(short, long)]
        asset: Option<String>,

        /// Keep only the newest N snapshots per asset
        #[arg(long)]
        prune: Option<usize>,

        /// Compact the database file
        #[arg(long)]
        compact: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AssetFlowError> {
    let json_mode = cli.json_mode;
    let project = load_project(&cli.config, cli.state.as_deref())?;

    match cli.command {
        Some(Commands::Graph { asset }) => cmd_graph(&project, json_mode, asset.as_deref()),
        Some(Commands::ExecutionSet { asset }) => cmd_execution_set(&project, json_mode, &asset),
        Some(Commands::SameRun { child, parent }) => {
            cmd_same_run(&project, json_mode, &child, &parent)
        }
        Some(Commands::Tick {
            status,
            now,
            dry_run,
        }) => cmd_tick(&project, json_mode, status.as_deref(), now.as_deref(), dry_run),
        Some(Commands::State {
            asset,
            prune,
            compact,
        }) => cmd_state(&project, json_mode, asset.as_deref(), prune, compact),
        None => {
            // No subcommand - show the graph by default
            cmd_graph(&project, json_mode, None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tick_flags_parse() {
        let cli = Cli::try_parse_from([
            "assetflow",
            "--config",
            "project.toml",
            "--json-mode",
            "tick",
            "--now",
            "2024-01-02T00:00:00Z",
            "--dry-run",
        ])
        .expect("parse");
        assert!(cli.json_mode);
        assert!(matches!(
            cli.command,
            Some(Commands::Tick { dry_run: true, .. })
        ));
    }
}
