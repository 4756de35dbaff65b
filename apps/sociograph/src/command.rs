//! # Session Commands
//!
//! The command surface shared by the interactive session, script files and
//! `POST /command`.
//!
//! Commands arrive either as JSON (`{"command": "add-edge", "source": "a",
//! "target": "b"}`) or as a line of text:
//!
//! ```text
//! add-node x sex=f age=3
//! add-edge x y
//! select x y x--y
//! toggle x y
//! remove-node
//! undo
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sociograph_core::{
    Attributes, Edge, GraphError, GraphMetrics, NodeId, Session, SubjectId, Trainer, VersionId,
    VersionManifest, attr_from_json,
};
use std::sync::Arc;

/// Separator between the endpoints of an edge token (`a--b`).
pub const EDGE_SEPARATOR: &str = "--";

pub const HELP: &str = "\
Commands:
  add-node ID [NAME=VALUE ...]   insert a node (at least one attribute)
  remove-node [ID ...]           remove nodes, or the selected nodes
  add-edge A B                   insert the edge A--B
  remove-edge [A B ...]          remove edges by endpoint pairs, or the selected edges
  select [ID | A--B ...]         replace the selection
  deselect                       clear the selection
  toggle ID | toggle A B         flip the selection of a node or an edge
  undo | redo                    walk the history
  save                           write the graph into the current version
  retrain                        train on the graph and commit a new version
  activate vN                    switch to another version
  status | history | versions | predictions
  help | quit";

// =============================================================================
// COMMANDS
// =============================================================================

/// One session command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum SessionCommand {
    AddNode {
        id: String,
        #[serde(default)]
        attributes: Map<String, Value>,
    },
    RemoveNode {
        #[serde(default)]
        ids: Vec<String>,
    },
    AddEdge {
        source: String,
        target: String,
    },
    RemoveEdge {
        #[serde(default)]
        edges: Vec<(String, String)>,
    },
    Select {
        #[serde(default)]
        nodes: Vec<String>,
        #[serde(default)]
        edges: Vec<(String, String)>,
    },
    Deselect,
    /// One id toggles a node, two ids toggle an edge.
    Toggle {
        ids: Vec<String>,
    },
    Undo,
    Redo,
    Save,
    Retrain,
    Activate {
        version: VersionId,
    },
    Status,
    History,
    Versions,
    Predictions,
    Help,
    Quit,
}

fn usage(msg: impl Into<String>) -> GraphError {
    GraphError::Usage(msg.into())
}

fn edge_pairs(tokens: &[&str]) -> Result<Vec<(String, String)>, GraphError> {
    if tokens.len() % 2 != 0 {
        return Err(usage("edges are given as endpoint pairs"));
    }
    Ok(tokens
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}

fn attribute_token(token: &str) -> Result<(String, Value), GraphError> {
    let (name, raw) = token
        .split_once('=')
        .ok_or_else(|| usage(format!("expected NAME=VALUE, got '{}'", token)))?;
    if name.is_empty() {
        return Err(usage(format!("attribute without a name in '{}'", token)));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

/// Parse one line of text. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<SessionCommand>, GraphError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (head, args) = match tokens.split_first() {
        Some((head, args)) => (*head, args),
        None => return Ok(None),
    };

    let command = match (head, args) {
        ("add-node", [id, attrs @ ..]) => SessionCommand::AddNode {
            id: (*id).to_string(),
            attributes: attrs
                .iter()
                .map(|t| attribute_token(t))
                .collect::<Result<_, _>>()?,
        },
        ("remove-node", ids) => SessionCommand::RemoveNode {
            ids: ids.iter().map(|s| (*s).to_string()).collect(),
        },
        ("add-edge", [source, target]) => SessionCommand::AddEdge {
            source: (*source).to_string(),
            target: (*target).to_string(),
        },
        ("remove-edge", pairs) => SessionCommand::RemoveEdge {
            edges: edge_pairs(pairs)?,
        },
        ("select", items) => {
            let mut nodes = Vec::new();
            let mut edges = Vec::new();
            for item in items {
                match item.split_once(EDGE_SEPARATOR) {
                    Some((a, b)) if !a.is_empty() && !b.is_empty() => {
                        edges.push((a.to_string(), b.to_string()));
                    }
                    _ => nodes.push((*item).to_string()),
                }
            }
            SessionCommand::Select { nodes, edges }
        }
        ("deselect", []) => SessionCommand::Deselect,
        ("toggle", ids @ ([_] | [_, _])) => SessionCommand::Toggle {
            ids: ids.iter().map(|s| (*s).to_string()).collect(),
        },
        ("undo", []) => SessionCommand::Undo,
        ("redo", []) => SessionCommand::Redo,
        ("save", []) => SessionCommand::Save,
        ("retrain", []) => SessionCommand::Retrain,
        ("activate", [version]) => SessionCommand::Activate {
            version: version.parse()?,
        },
        ("status", []) => SessionCommand::Status,
        ("history", []) => SessionCommand::History,
        ("versions", []) => SessionCommand::Versions,
        ("predictions", []) => SessionCommand::Predictions,
        ("help", _) => SessionCommand::Help,
        ("quit" | "exit", []) => SessionCommand::Quit,
        (
            "add-node" | "add-edge" | "deselect" | "toggle" | "undo" | "redo" | "save" | "retrain"
            | "activate" | "status" | "history" | "versions" | "predictions" | "quit" | "exit",
            _,
        ) => return Err(usage(format!("wrong arguments for '{}', see 'help'", head))),
        (other, _) => return Err(usage(format!("unknown command '{}', see 'help'", other))),
    };
    Ok(Some(command))
}

// =============================================================================
// REPORTS
// =============================================================================

/// Snapshot of the session for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub subject: SubjectId,
    pub current_version: Option<VersionId>,
    pub version_count: usize,
    pub metrics: GraphMetrics,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Target version of the running retrain.
    pub retraining: Option<VersionId>,
}

impl StatusReport {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            subject: session.context().subject().clone(),
            current_version: session.context().current(),
            version_count: session.context().versions().len(),
            metrics: session.metrics(),
            can_undo: session.can_undo(),
            can_redo: session.can_redo(),
            retraining: session.retrain_target(),
        }
    }

    fn render(&self) -> String {
        let version = self
            .current_version
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        let mut out = format!(
            "subject {} at {} ({} versions)\nnodes {}  edges {}  selected {}/{}\nhanging {}  density {} per thousand",
            self.subject,
            version,
            self.version_count,
            self.metrics.node_count,
            self.metrics.edge_count,
            self.metrics.selected_nodes,
            self.metrics.selected_edges,
            self.metrics.hanging_nodes,
            self.metrics.density_per_thousand(),
        );
        if let Some(target) = self.retraining {
            out.push_str(&format!("\nretrain to {} in progress", target));
        }
        out
    }
}

/// One version as listed by `versions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: VersionId,
    pub current: bool,
    /// `None` when the manifest could not be read.
    pub manifest: Option<VersionManifest>,
}

#[must_use]
pub fn version_entries(session: &Session) -> Vec<VersionEntry> {
    let context = session.context();
    context
        .versions()
        .iter()
        .map(|&version| VersionEntry {
            version,
            current: context.current() == Some(version),
            manifest: session.versions().manifest(context.subject(), version).ok(),
        })
        .collect()
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Set by `quit`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub quit: bool,
}

impl CommandReply {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            quit: false,
        }
    }

    fn with_data(message: impl Into<String>, data: &impl Serialize) -> Self {
        Self {
            message: message.into(),
            data: serde_json::to_value(data).ok(),
            quit: false,
        }
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

fn to_edges(pairs: Vec<(String, String)>) -> Vec<Edge> {
    pairs.into_iter().map(|(a, b)| Edge::new(a, b)).collect()
}

fn to_ids(ids: Vec<String>) -> Vec<NodeId> {
    ids.into_iter().map(NodeId::from).collect()
}

/// Convert JSON attributes using the session's declared kinds.
pub fn attributes_for(session: &Session, raw: Map<String, Value>) -> Result<Attributes, GraphError> {
    let schema = session.graph().schema();
    let mut attrs = Attributes::new();
    for (name, value) in raw {
        if let Some(converted) = attr_from_json(&name, &value, schema.kind_of(&name))? {
            attrs.insert(name, converted);
        }
    }
    Ok(attrs)
}

/// Run one command against the session. `retrain` blocks until the trainer finishes.
pub fn run_command(
    session: &mut Session,
    trainer: &Arc<dyn Trainer>,
    command: SessionCommand,
) -> Result<CommandReply, GraphError> {
    let reply = match command {
        SessionCommand::AddNode { id, attributes } => {
            let attrs = attributes_for(session, attributes)?;
            session.add_node(id.as_str(), attrs)?;
            CommandReply::message(format!("added node {}", id))
        }
        SessionCommand::RemoveNode { ids } => {
            let before = session.graph().node_count();
            session.remove_nodes(to_ids(ids))?;
            let removed = before.saturating_sub(session.graph().node_count());
            CommandReply::message(format!("removed {} node(s)", removed))
        }
        SessionCommand::AddEdge { source, target } => {
            session.add_edge(source.as_str(), target.as_str())?;
            CommandReply::message(format!("added edge {}{}{}", source, EDGE_SEPARATOR, target))
        }
        SessionCommand::RemoveEdge { edges } => {
            let before = session.graph().edge_count();
            session.remove_edges(to_edges(edges))?;
            let removed = before.saturating_sub(session.graph().edge_count());
            CommandReply::message(format!("removed {} edge(s)", removed))
        }
        SessionCommand::Select { nodes, edges } => {
            session.select(to_ids(nodes), to_edges(edges))?;
            let selection = session.graph().selection();
            CommandReply::with_data(
                format!(
                    "selected {} node(s), {} edge(s)",
                    selection.node_count(),
                    selection.edge_count()
                ),
                selection,
            )
        }
        SessionCommand::Deselect => {
            session.deselect()?;
            CommandReply::message("selection cleared")
        }
        SessionCommand::Toggle { ids } => match ids.as_slice() {
            [id] => {
                session.toggle_node(id.as_str())?;
                let on = session.graph().selection().contains_node(&NodeId::new(id.as_str()));
                CommandReply::message(format!("{} {}", id, if on { "selected" } else { "deselected" }))
            }
            [a, b] => {
                let edge = Edge::new(a.as_str(), b.as_str());
                session.toggle_edge(edge.clone())?;
                let on = session.graph().selection().contains_edge(&edge);
                CommandReply::message(format!(
                    "{}{}{} {}",
                    a,
                    EDGE_SEPARATOR,
                    b,
                    if on { "selected" } else { "deselected" }
                ))
            }
            _ => return Err(usage("toggle takes one node id or two edge endpoints")),
        },
        SessionCommand::Undo => CommandReply::message(format!("undid {}", session.undo()?)),
        SessionCommand::Redo => CommandReply::message(format!("redid {}", session.redo()?)),
        SessionCommand::Save => {
            session.save()?;
            let version = session
                .context()
                .current()
                .map_or_else(|| "-".to_string(), |v| v.to_string());
            CommandReply::message(format!("saved into {}", version))
        }
        SessionCommand::Retrain => {
            let report = session.retrain(Arc::clone(trainer))?;
            CommandReply::with_data(
                format!(
                    "retrained with {} into {} ({} predicted edge(s))",
                    report.trainer,
                    report.version,
                    report.predicted_edges.len()
                ),
                &report,
            )
        }
        SessionCommand::Activate { version } => {
            session.activate_version(version)?;
            CommandReply::message(format!("activated {}", version))
        }
        SessionCommand::Status => {
            let status = StatusReport::from_session(session);
            CommandReply::with_data(status.render(), &status)
        }
        SessionCommand::History => {
            let history = session.history();
            let text = if history.is_empty() {
                "history is empty".to_string()
            } else {
                history
                    .iter()
                    .enumerate()
                    .map(|(i, label)| format!("{:>3}  {}", i + 1, label))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            CommandReply::with_data(text, &history)
        }
        SessionCommand::Versions => {
            let entries = version_entries(session);
            let text = entries
                .iter()
                .map(|e| {
                    let origin = e
                        .manifest
                        .as_ref()
                        .map_or_else(|| "unreadable".to_string(), |m| format!("{:?}", m.origin).to_lowercase());
                    format!("{} {} {}", if e.current { "*" } else { " " }, e.version, origin)
                })
                .collect::<Vec<_>>()
                .join("\n");
            CommandReply::with_data(text, &entries)
        }
        SessionCommand::Predictions => {
            let predicted = session.predicted_edges();
            let text = if predicted.is_empty() {
                "no predicted edges".to_string()
            } else {
                predicted
                    .iter()
                    .map(|e| format!("{}{}{}", e.source, EDGE_SEPARATOR, e.target))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            CommandReply::with_data(text, &predicted)
        }
        SessionCommand::Help => CommandReply::message(HELP),
        SessionCommand::Quit => CommandReply {
            message: "bye".to_string(),
            data: None,
            quit: true,
        },
    };
    Ok(reply)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sociograph_core::{CheckpointFormat, SimilarityTrainer, VersionManager};
    use tempfile::TempDir;

    fn parse(line: &str) -> SessionCommand {
        parse_line(line).expect("parse").expect("command")
    }

    fn session(dir: &TempDir) -> Session {
        let mgr = VersionManager::open(dir.path(), CheckpointFormat::Binary).expect("manager");
        Session::open(mgr, SubjectId::new("bat").expect("subject"), None).expect("session")
    }

    #[test]
    fn parses_text_commands() {
        assert_eq!(
            parse("add-node x sex=f age=3"),
            SessionCommand::AddNode {
                id: "x".to_string(),
                attributes: json!({"sex": "f", "age": 3})
                    .as_object()
                    .cloned()
                    .expect("object"),
            }
        );
        assert_eq!(
            parse("select a a--b"),
            SessionCommand::Select {
                nodes: vec!["a".to_string()],
                edges: vec![("a".to_string(), "b".to_string())],
            }
        );
        assert_eq!(parse("remove-node"), SessionCommand::RemoveNode { ids: vec![] });
        assert_eq!(
            parse("activate v3"),
            SessionCommand::Activate {
                version: VersionId(3)
            }
        );
        assert_eq!(parse("exit"), SessionCommand::Quit);
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("   ").expect("parse"), None);
        assert_eq!(parse_line("# note").expect("parse"), None);
    }

    #[test]
    fn malformed_lines_are_usage_errors() {
        for line in ["frobnicate", "add-edge a", "toggle a b c", "remove-edge a", "add-node x age"] {
            let err = parse_line(line).expect_err(line);
            assert_eq!(err.exit_code(), 2, "{}", line);
        }
    }

    #[test]
    fn json_commands_use_kebab_case_tags() {
        let cmd: SessionCommand =
            serde_json::from_value(json!({"command": "add-edge", "source": "a", "target": "b"}))
                .expect("decode");
        assert_eq!(
            cmd,
            SessionCommand::AddEdge {
                source: "a".to_string(),
                target: "b".to_string()
            }
        );
        let cmd: SessionCommand =
            serde_json::from_value(json!({"command": "remove-node"})).expect("decode");
        assert_eq!(cmd, SessionCommand::RemoveNode { ids: vec![] });
    }

    #[test]
    fn runs_an_editing_round() {
        let dir = TempDir::new().expect("tempdir");
        let mut session = session(&dir);
        let trainer: Arc<dyn Trainer> = Arc::new(SimilarityTrainer::default());

        for line in ["add-node a sex=f", "add-node b sex=f", "add-edge a b", "toggle b a"] {
            run_command(&mut session, &trainer, parse(line)).expect(line);
        }
        assert_eq!(session.graph().edge_count(), 1);
        assert!(session.graph().selection().edges().next().is_none());

        let reply = run_command(&mut session, &trainer, parse("history")).expect("history");
        assert_eq!(reply.data, Some(json!(["add-node a", "add-node b", "add-edge a b", "toggle b a"])));

        let reply = run_command(&mut session, &trainer, parse("undo")).expect("undo");
        assert!(reply.message.starts_with("undid"));
        let reply = run_command(&mut session, &trainer, parse("quit")).expect("quit");
        assert!(reply.quit);
    }

    #[test]
    fn numeric_text_follows_declared_kind() {
        let dir = TempDir::new().expect("tempdir");
        let mut session = session(&dir);
        let trainer: Arc<dyn Trainer> = Arc::new(SimilarityTrainer::default());

        run_command(&mut session, &trainer, parse("add-node a tag=alpha")).expect("a");
        run_command(&mut session, &trainer, parse("add-node b tag=7")).expect("b");
        assert_eq!(
            session.graph().node(&NodeId::new("b")).and_then(|a| a.get("tag")),
            Some(&sociograph_core::AttrValue::Str("7".to_string()))
        );
    }
}
