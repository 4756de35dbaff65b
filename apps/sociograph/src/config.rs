//! # Configuration
//!
//! Settings are merged from three layers, later layers winning:
//!
//! 1. `sociograph.toml` (or the file given with `--config`)
//! 2. Environment: `SOCIOGRAPH_ROOT`, `SOCIOGRAPH_SUBJECT`, `SOCIOGRAPH_SOURCE`,
//!    `SOCIOGRAPH_FORMAT`, `SOCIOGRAPH_TRAINER_CMD`, `SOCIOGRAPH_CORS_ORIGINS`
//! 3. Command-line flags
//!
//! ```toml
//! version_root = "versions"
//! subject = "bat-17"
//! source = "colony.json"
//! checkpoint_format = "binary"
//! cors_origins = ["http://lab.example:5173"]
//!
//! [trainer]
//! kind = "command"
//! command = ["python", "train.py", "--in", "{input}", "--out", "{output}"]
//! ```
//!
//! `command` may also be a single line, split on whitespace without quoting.

use serde::Deserialize;
use sociograph_core::{
    CheckpointFormat, CommandTrainer, GraphError, Session, SimilarityTrainer, SubjectId, Trainer,
    VersionManager, load_node_link_file, primitives::DEFAULT_PREDICTION_TOP_K,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "sociograph.toml";

const DEFAULT_ROOT: &str = "versions";
const DEFAULT_SUBJECT: &str = "default";

// =============================================================================
// FILE LAYER
// =============================================================================

/// Trainer selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrainerConfig {
    /// Offline attribute-similarity predictions.
    Similarity {
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
    /// External training program.
    Command {
        command: TrainerCommand,
        #[serde(default)]
        work_dir: Option<PathBuf>,
    },
}

/// An external trainer invocation, as an argument list or a plain line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrainerCommand {
    Argv(Vec<String>),
    /// Split on whitespace; quotes are rejected.
    Line(String),
}

fn default_top_k() -> usize {
    DEFAULT_PREDICTION_TOP_K
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig::Similarity {
            top_k: DEFAULT_PREDICTION_TOP_K,
        }
    }
}

/// Origins the HTTP server answers cross-origin requests from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CorsOrigins {
    /// The server's own port on `localhost` and `127.0.0.1`.
    #[default]
    Loopback,
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    /// `*` anywhere means any origin; an empty list falls back to loopback.
    #[must_use]
    pub fn from_list<S: AsRef<str>>(origins: &[S]) -> Self {
        let origins: Vec<String> = origins
            .iter()
            .map(|o| o.as_ref().trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else if origins.is_empty() {
            CorsOrigins::Loopback
        } else {
            CorsOrigins::List(origins)
        }
    }

    /// Parse the comma-separated form used by `SOCIOGRAPH_CORS_ORIGINS`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::from_list(&raw.split(',').collect::<Vec<_>>())
    }
}

/// Contents of `sociograph.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub version_root: Option<PathBuf>,
    pub subject: Option<String>,
    pub source: Option<PathBuf>,
    pub checkpoint_format: Option<CheckpointFormat>,
    pub cors_origins: Option<Vec<String>>,
    pub trainer: Option<TrainerConfig>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text).map_err(|e| GraphError::Usage(format!("invalid configuration: {}", e)))
    }

    /// Read `path`. A missing default file is an empty configuration.
    pub fn read(path: Option<&Path>) -> Result<Self, GraphError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(GraphError::IoFailure(format!("{}: {}", path.display(), e))),
        }
    }
}

// =============================================================================
// MERGED CONFIGURATION
// =============================================================================

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub version_root: Option<PathBuf>,
    pub subject: Option<String>,
    pub source: Option<PathBuf>,
    pub checkpoint_format: Option<CheckpointFormat>,
}

/// Fully resolved application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub version_root: PathBuf,
    pub subject: SubjectId,
    /// Node-link file used to bootstrap `v0` of a new subject.
    pub source: Option<PathBuf>,
    pub checkpoint_format: CheckpointFormat,
    pub cors: CorsOrigins,
    pub trainer: TrainerConfig,
}

impl AppConfig {
    /// Resolve from the config file, the process environment and `overrides`.
    pub fn load(config: Option<&Path>, overrides: &Overrides) -> Result<Self, GraphError> {
        let file = FileConfig::read(config)?;
        Self::resolve(file, |key| std::env::var(key).ok(), overrides)
    }

    /// Merge the three layers. `env` looks up one environment variable.
    pub fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self, GraphError> {
        let version_root = overrides
            .version_root
            .clone()
            .or_else(|| env("SOCIOGRAPH_ROOT").map(PathBuf::from))
            .or(file.version_root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        let subject = overrides
            .subject
            .clone()
            .or_else(|| env("SOCIOGRAPH_SUBJECT"))
            .or(file.subject)
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        let source = overrides
            .source
            .clone()
            .or_else(|| env("SOCIOGRAPH_SOURCE").map(PathBuf::from))
            .or(file.source);

        let checkpoint_format = match (overrides.checkpoint_format, env("SOCIOGRAPH_FORMAT")) {
            (Some(format), _) => format,
            (None, Some(raw)) => raw
                .parse()
                .map_err(|e| GraphError::Usage(format!("SOCIOGRAPH_FORMAT: {}", e)))?,
            (None, None) => file.checkpoint_format.unwrap_or_default(),
        };

        let cors = match (env("SOCIOGRAPH_CORS_ORIGINS"), file.cors_origins) {
            (Some(raw), _) => CorsOrigins::parse(&raw),
            (None, Some(list)) => CorsOrigins::from_list(&list),
            (None, None) => CorsOrigins::Loopback,
        };

        let trainer = match env("SOCIOGRAPH_TRAINER_CMD") {
            Some(line) => TrainerConfig::Command {
                command: TrainerCommand::Line(line),
                work_dir: None,
            },
            None => file.trainer.unwrap_or_default(),
        };

        Ok(Self {
            version_root,
            subject: SubjectId::new(subject)?,
            source,
            checkpoint_format,
            cors,
            trainer,
        })
    }

    /// Build the configured trainer.
    pub fn build_trainer(&self) -> Result<Arc<dyn Trainer>, GraphError> {
        match &self.trainer {
            TrainerConfig::Similarity { top_k } => Ok(Arc::new(SimilarityTrainer::new(*top_k))),
            TrainerConfig::Command { command, work_dir } => {
                let dir = work_dir
                    .clone()
                    .unwrap_or_else(|| self.version_root.join(".training"));
                let trainer = match command {
                    TrainerCommand::Argv(argv) => CommandTrainer::from_argv(argv.clone(), dir)?,
                    TrainerCommand::Line(line) => CommandTrainer::from_command_line(line, dir)?,
                };
                Ok(Arc::new(trainer))
            }
        }
    }

    pub fn open_manager(&self) -> Result<VersionManager, GraphError> {
        VersionManager::open(&self.version_root, self.checkpoint_format)
    }

    /// Open the editing session, bootstrapping from `source` on first use.
    pub fn open_session(&self) -> Result<Session, GraphError> {
        let manager = self.open_manager()?;
        let fresh = manager.list_versions(&self.subject)?.is_empty();
        let source = match (&self.source, fresh) {
            (Some(path), true) => {
                let (state, report) = load_node_link_file(path)?;
                if !report.pruned_nodes.is_empty() || !report.dropped_links.is_empty() {
                    tracing::warn!(
                        pruned = report.pruned_nodes.len(),
                        dropped = report.dropped_links.len(),
                        "source graph was cleaned while loading"
                    );
                }
                Some(state)
            }
            _ => None,
        };
        Session::open(manager, self.subject.clone(), source)
    }
}

// =============================================================================
// TESTS
// =============================================================================
