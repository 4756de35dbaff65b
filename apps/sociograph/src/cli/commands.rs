//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::ExportKind;
use crate::api;
use crate::command::{
    CommandReply, SessionCommand, StatusReport, parse_line, run_command, version_entries,
};
use crate::config::AppConfig;
use sociograph_core::{GraphError, Session, Trainer, VersionId, state_to_bytes};
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

/// Maximum script size accepted by `run` (16 MB).
const MAX_SCRIPT_SIZE: u64 = 16 * 1024 * 1024;

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json_mode: bool,
    pub quiet: bool,
}

impl Output {
    /// Print a reply: its JSON form in json mode, its message otherwise.
    pub fn reply(&self, reply: &CommandReply) {
        if self.json_mode {
            println!(
                "{}",
                serde_json::to_string(reply).unwrap_or_else(|_| "{}".to_string())
            );
        } else if !reply.message.is_empty() {
            println!("{}", reply.message);
        }
    }

    fn error(&self, e: &GraphError) {
        if self.json_mode {
            let body = serde_json::json!({
                "error": { "kind": e.kind(), "message": e.to_string() }
            });
            println!("{}", body);
        } else {
            eprintln!("error: {}", e);
        }
    }
}

fn single(
    config: &AppConfig,
    out: Output,
    command: SessionCommand,
) -> Result<(), GraphError> {
    let mut session = config.open_session()?;
    let trainer = config.build_trainer()?;
    let reply = run_command(&mut session, &trainer, command)?;
    out.reply(&reply);
    Ok(())
}

// =============================================================================
// ONE-SHOT COMMANDS
// =============================================================================

/// Create v0, or report the existing current version.
pub fn cmd_init(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    let existed = !config
        .open_manager()?
        .list_versions(&config.subject)?
        .is_empty();
    let session = config.open_session()?;
    let status = StatusReport::from_session(&session);
    let version = status
        .current_version
        .map_or_else(|| "-".to_string(), |v| v.to_string());
    let message = if existed {
        format!("subject {} already initialized, current {}", config.subject, version)
    } else {
        format!(
            "initialized {} at {} with {} nodes and {} edges",
            config.subject, version, status.metrics.node_count, status.metrics.edge_count
        )
    };
    out.reply(&CommandReply {
        message,
        data: serde_json::to_value(&status).ok(),
        quit: false,
    });
    Ok(())
}

pub fn cmd_status(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    single(config, out, SessionCommand::Status)
}

pub fn cmd_versions(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    if out.json_mode {
        let session = config.open_session()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&version_entries(&session)).unwrap_or_default()
        );
        return Ok(());
    }
    single(config, out, SessionCommand::Versions)
}

pub fn cmd_predictions(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    single(config, out, SessionCommand::Predictions)
}

pub fn cmd_retrain(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    single(config, out, SessionCommand::Retrain)
}

pub fn cmd_activate(config: &AppConfig, out: Output, version: VersionId) -> Result<(), GraphError> {
    single(config, out, SessionCommand::Activate { version })
}

/// Write the current graph in one of the export forms.
pub fn cmd_export(config: &AppConfig, output: &Path, kind: ExportKind) -> Result<(), GraphError> {
    let session = config.open_session()?;
    let bytes = match kind {
        ExportKind::Training => serde_json::to_vec_pretty(&session.training_input()),
        ExportKind::View => serde_json::to_vec_pretty(&session.render_view()),
        ExportKind::Checkpoint => {
            return write_file(
                output,
                &state_to_bytes(session.graph().state(), config.checkpoint_format)?,
            );
        }
    }
    .map_err(|e| GraphError::Serialization(format!("export: {}", e)))?;
    write_file(output, &bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), GraphError> {
    std::fs::write(path, bytes)
        .map_err(|e| GraphError::IoFailure(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "export written");
    Ok(())
}

// =============================================================================
// INTERACTIVE SESSION
// =============================================================================

/// Outcome of feeding one line to a session.
enum Step {
    Continue,
    Quit,
}

fn step(
    session: &mut Session,
    trainer: &Arc<dyn Trainer>,
    out: Output,
    line: &str,
) -> Result<Step, GraphError> {
    let Some(command) = parse_line(line)? else {
        return Ok(Step::Continue);
    };
    let reply = run_command(session, trainer, command)?;
    out.reply(&reply);
    Ok(if reply.quit { Step::Quit } else { Step::Continue })
}

/// Report a failed line and keep going, unless the error is fatal.
fn recover(out: Output, e: GraphError) -> Result<Step, GraphError> {
    if e.is_fatal() {
        tracing::error!(error = %e, "graph invariant broken, ending session");
        return Err(e);
    }
    out.error(&e);
    Ok(Step::Continue)
}

/// Read commands from stdin until `quit`, end of input or a fatal error.
pub fn cmd_session(config: &AppConfig, out: Output) -> Result<(), GraphError> {
    let mut session = config.open_session()?;
    let trainer = config.build_trainer()?;
    let interactive = std::io::stdin().is_terminal() && !out.quiet;

    if interactive {
        println!(
            "sociograph {} - subject {} at {}. Type 'help' for commands.",
            env!("CARGO_PKG_VERSION"),
            config.subject,
            session
                .context()
                .current()
                .map_or_else(|| "-".to_string(), |v| v.to_string())
        );
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("sociograph> ");
            let _ = std::io::stdout().flush();
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|e| GraphError::IoFailure(format!("stdin: {}", e)))?;
        let next = step(&mut session, &trainer, out, &line).or_else(|e| recover(out, e))?;
        if matches!(next, Step::Quit) {
            break;
        }
    }

    if session.can_undo() && interactive {
        println!("unsaved edits are only kept if you ran 'save'");
    }
    Ok(())
}

/// Run a script. Stops at the first failing line unless `keep_going`;
/// a fatal error always stops it.
pub fn cmd_run(
    config: &AppConfig,
    out: Output,
    file: &Path,
    keep_going: bool,
) -> Result<(), GraphError> {
    let metadata = std::fs::metadata(file)
        .map_err(|e| GraphError::IoFailure(format!("{}: {}", file.display(), e)))?;
    if metadata.len() > MAX_SCRIPT_SIZE {
        return Err(GraphError::Usage(format!(
            "script is {} bytes, the limit is {}",
            metadata.len(),
            MAX_SCRIPT_SIZE
        )));
    }
    let script = std::fs::read_to_string(file)
        .map_err(|e| GraphError::IoFailure(format!("{}: {}", file.display(), e)))?;

    let mut session = config.open_session()?;
    let trainer = config.build_trainer()?;
    let mut first_error = None;

    for (number, line) in script.lines().enumerate() {
        match step(&mut session, &trainer, out, line) {
            Ok(Step::Quit) => break,
            Ok(Step::Continue) => {}
            Err(e) if e.is_fatal() => return recover(out, e).map(|_| ()),
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "script line failed");
                out.error(&e);
                if !keep_going {
                    return Err(e);
                }
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    config: &AppConfig,
    out: Output,
    host: &str,
    port: u16,
) -> Result<(), GraphError> {
    let session = config.open_session()?;
    let trainer = config.build_trainer()?;

    if !out.quiet {
        println!("Sociograph Session Server Starting...");
        println!();
        println!("Configuration:");
        println!("  Host:     {}", host);
        println!("  Port:     {}", port);
        println!("  Root:     {}", config.version_root.display());
        println!("  Subject:  {}", config.subject);
        println!("  Trainer:  {}", trainer.name());
        println!("  CORS:     {:?}", config.cors);
        println!();
        println!("Press Ctrl+C to stop");
        println!();
    }

    api::run_server(host, port, &config.cors, session, trainer).await
}

// =============================================================================
// TESTS
// =============================================================================
