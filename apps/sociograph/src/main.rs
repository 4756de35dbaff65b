//! # Sociograph
//!
//! Reversible graph editing with versioned retraining.
//!
//! ## Usage
//!
//! ```bash
//! # Create v0 from a node-link file
//! sociograph -R versions -S bats init --source bats.json
//!
//! # Edit interactively, then retrain into v1
//! sociograph -S bats session
//! sociograph -S bats retrain
//!
//! # Serve the session over HTTP
//! sociograph -S bats server --port 8080
//! ```
//!
//! ## Logging
//!
//! Logs go to stderr. `SOCIOGRAPH_LOG` (or `RUST_LOG`) sets the filter,
//! `SOCIOGRAPH_LOG_FORMAT=json` switches to JSON lines.

use clap::Parser;
use sociograph::cli;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "sociograph=debug,sociograph_core=debug,tower_http=debug"
    } else {
        "sociograph=info,sociograph_core=info"
    };
    let filter = EnvFilter::try_from_env("SOCIOGRAPH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_format = std::env::var("SOCIOGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(kind = ?e.kind(), "{}", e);
        std::process::exit(e.exit_code());
    }
}
