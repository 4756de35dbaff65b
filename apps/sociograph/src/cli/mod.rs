//! # Sociograph CLI Module
//!
//! This module implements the CLI interface for sociograph.
//!
//! ## Available Commands
//!
//! - `init` - Create `v0` of a subject, optionally from a node-link file
//! - `status` - Show the current version and graph metrics
//! - `versions` - List versions with their provenance
//! - `predictions` - Show edges predicted by the current version's retrain
//! - `session` - Interactive editing session
//! - `run` - Run a script of session commands
//! - `retrain` - Retrain the current graph into a new version
//! - `activate` - Make another version current
//! - `export` - Write training input, render view or checkpoint to a file
//! - `server` - Serve the editing session over HTTP

mod commands;

use crate::config::{AppConfig, Overrides};
use clap::{Parser, Subcommand, ValueEnum};
use sociograph_core::{CheckpointFormat, GraphError, VersionId};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Sociograph - reversible graph editing with versioned retraining
#[derive(Parser, Debug)]
#[command(name = "sociograph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banners and prompts
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Version root directory
    #[arg(short = 'R', long, global = true)]
    pub root: Option<PathBuf>,

    /// Subject whose versions are edited
    #[arg(short = 'S', long, global = true)]
    pub subject: Option<String>,

    /// Configuration file (default: ./sociograph.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Encoding of new checkpoints: binary or json
    #[arg(long, global = true)]
    pub format: Option<CheckpointFormat>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// What `export` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    /// Feature matrix, edge list and adjacency as JSON
    Training,
    /// Render view as JSON
    View,
    /// Checkpoint in the configured format
    Checkpoint,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create v0 of the subject
    Init {
        /// Node-link JSON file to load into v0
        #[arg(short, long)]
        source: Option<PathBuf>,
    },

    /// Show status of the current version
    Status,

    /// List versions
    Versions,

    /// Show predicted edges of the current version
    Predictions,

    /// Start an interactive editing session
    Session,

    /// Run session commands from a file, one per line
    Run {
        /// Script file
        file: PathBuf,

        /// Continue after a failing line
        #[arg(short, long)]
        keep_going: bool,
    },

    /// Retrain the current graph into a new version
    Retrain,

    /// Make another version current
    Activate {
        /// Version id, e.g. v2
        version: VersionId,
    },

    /// Export the current graph
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// What to export
        #[arg(short = 't', long, value_enum, default_value = "training")]
        kind: ExportKind,
    },

    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

impl Cli {
    /// Resolve configuration with this invocation's flags on top.
    pub fn resolve_config(&self, source: Option<PathBuf>) -> Result<AppConfig, GraphError> {
        let overrides = Overrides {
            version_root: self.root.clone(),
            subject: self.subject.clone(),
            source,
            checkpoint_format: self.format,
        };
        AppConfig::load(self.config.as_deref(), &overrides)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let source = match &cli.command {
        Some(Commands::Init { source }) => source.clone(),
        _ => None,
    };
    let config = cli.resolve_config(source)?;
    let out = Output {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
    };

    match cli.command {
        Some(Commands::Init { .. }) => cmd_init(&config, out),
        Some(Commands::Status) | None => cmd_status(&config, out),
        Some(Commands::Versions) => cmd_versions(&config, out),
        Some(Commands::Predictions) => cmd_predictions(&config, out),
        Some(Commands::Session) => cmd_session(&config, out),
        Some(Commands::Run { file, keep_going }) => cmd_run(&config, out, &file, keep_going),
        Some(Commands::Retrain) => cmd_retrain(&config, out),
        Some(Commands::Activate { version }) => cmd_activate(&config, out, version),
        Some(Commands::Export { output, kind }) => cmd_export(&config, &output, kind),
        Some(Commands::Server { host, port }) => cmd_server(&config, out, &host, port).await,
    }
}
