//! # Training Collaborator
//!
//! The seam between the editor and a link-prediction trainer.
//!
//! A [`Trainer`] turns a [`TrainingRequest`] into a [`TrainingOutcome`].
//! [`RetrainJob`] runs one on a named worker thread and hands the result
//! back over a channel, so the session thread can keep serving
//! selection-only commands while training runs.
//!
//! Two trainers ship with the crate:
//! - [`CommandTrainer`] runs an external program over JSON files
//! - [`SimilarityTrainer`] predicts partners for hanging nodes from shared
//!   attribute values, offline and deterministic
//!
//! Any `Fn(&TrainingRequest, &CancelToken) -> Result<TrainingOutcome, GraphError>`
//! is a trainer too.

use crate::export::TrainingInput;
use crate::primitives::DEFAULT_PREDICTION_TOP_K;
use crate::types::{Edge, GraphError, SubjectId, VersionId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// REQUEST / OUTCOME
// =============================================================================

/// What a trainer is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub subject: SubjectId,
    /// Version the input was exported from.
    pub base_version: Option<VersionId>,
    /// Version the outcome will be stored under if it succeeds.
    pub target_version: VersionId,
    pub input: TrainingInput,
}

/// What a trainer produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Reference to the trained model (a path or URI), if the trainer keeps one.
    #[serde(default)]
    pub model_artifact: Option<String>,
    #[serde(default)]
    pub predicted_edges: Vec<Edge>,
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(RetrainCancelled)` once cancelled.
    pub fn check(&self) -> Result<(), GraphError> {
        if self.is_cancelled() {
            Err(GraphError::RetrainCancelled)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// TRAINER TRAIT
// =============================================================================

/// A link-prediction trainer.
///
/// Implementations run on a worker thread and should poll `cancel` between
/// units of work.
pub trait Trainer: Send + Sync {
    /// Name recorded in version manifests.
    fn name(&self) -> &str;

    fn train(
        &self,
        request: &TrainingRequest,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, GraphError>;
}

impl<F> Trainer for F
where
    F: Fn(&TrainingRequest, &CancelToken) -> Result<TrainingOutcome, GraphError> + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn train(
        &self,
        request: &TrainingRequest,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, GraphError> {
        self(request, cancel)
    }
}

// =============================================================================
// RETRAIN JOB
// =============================================================================

type JobResult = Result<TrainingOutcome, GraphError>;

/// A trainer running on its own thread.
#[derive(Debug)]
pub struct RetrainJob {
    cancel: CancelToken,
    rx: Mutex<mpsc::Receiver<JobResult>>,
    handle: Option<JoinHandle<()>>,
    target: VersionId,
}

impl RetrainJob {
    /// Start `trainer` on a worker thread.
    pub fn spawn(trainer: Arc<dyn Trainer>, request: TrainingRequest) -> Result<Self, GraphError> {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let target = request.target_version;
        let (tx, rx) = mpsc::channel::<JobResult>();

        let handle = thread::Builder::new()
            .name(format!("retrain-{}", request.subject))
            .spawn(move || {
                debug!(trainer = trainer.name(), target = %request.target_version, "training started");
                let result = trainer.train(&request, &token);
                let _ = tx.send(result);
            })
            .map_err(|e| GraphError::TrainingFailed(format!("failed to spawn worker: {}", e)))?;

        Ok(Self {
            cancel,
            rx: Mutex::new(rx),
            handle: Some(handle),
            target,
        })
    }

    /// Version the job will produce on success.
    #[must_use]
    pub fn target(&self) -> VersionId {
        self.target
    }

    /// Ask the trainer to stop. The result, whatever it is, will be discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking check for completion.
    pub fn try_poll(&mut self) -> Option<JobResult> {
        let received = {
            let rx = match self.rx.lock() {
                Ok(rx) => rx,
                Err(poisoned) => poisoned.into_inner(),
            };
            rx.try_recv()
        };
        match received {
            Ok(result) => Some(self.finish(result)),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(self.finish(Err(disconnected()))),
        }
    }

    /// Block until the trainer finishes.
    pub fn wait(mut self) -> JobResult {
        let received = {
            let rx = match self.rx.lock() {
                Ok(rx) => rx,
                Err(poisoned) => poisoned.into_inner(),
            };
            rx.recv()
        };
        let result = received.unwrap_or_else(|_| Err(disconnected()));
        self.finish(result)
    }

    fn finish(&mut self, result: JobResult) -> JobResult {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("retrain worker panicked");
        }
        if self.cancel.is_cancelled() {
            return Err(GraphError::RetrainCancelled);
        }
        result
    }
}

fn disconnected() -> GraphError {
    GraphError::TrainingFailed("worker exited without a result".to_string())
}

// =============================================================================
// COMMAND TRAINER
// =============================================================================

/// Runs an external program.
///
/// The request is written as JSON to `{work_dir}/{subject}-{version}.input.json`
/// and the program must write a [`TrainingOutcome`] as JSON to the output
/// path. Arguments may contain `{input}`, `{output}`, `{subject}` and
/// `{version}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    poll_interval: Duration,
}

impl CommandTrainer {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Build from an argument vector whose first element is the program.
    pub fn from_argv(argv: Vec<String>, work_dir: impl Into<PathBuf>) -> Result<Self, GraphError> {
        let mut parts = argv.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| GraphError::Usage("empty trainer command".to_string()))?;
        Ok(Self::new(program, parts.collect(), work_dir))
    }

    /// Split a plain command line on whitespace.
    ///
    /// Quoting and escapes are not interpreted, so a line containing quote
    /// or backslash characters is rejected. Use [`CommandTrainer::from_argv`]
    /// for arguments that contain spaces.
    pub fn from_command_line(line: &str, work_dir: impl Into<PathBuf>) -> Result<Self, GraphError> {
        if line.contains(['"', '\'', '\\']) {
            return Err(GraphError::Usage(format!(
                "trainer command line cannot be quoted, give it as an argument list: {}",
                line
            )));
        }
        Self::from_argv(line.split_whitespace().map(str::to_string).collect(), work_dir)
    }

    fn fail(&self, what: &str, e: impl std::fmt::Display) -> GraphError {
        GraphError::TrainingFailed(format!("{} ({}): {}", what, self.program, e))
    }
}

impl Trainer for CommandTrainer {
    fn name(&self) -> &str {
        &self.program
    }

    fn train(
        &self,
        request: &TrainingRequest,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, GraphError> {
        fs::create_dir_all(&self.work_dir).map_err(|e| self.fail("work dir", e))?;
        let stem = format!("{}-{}", request.subject, request.target_version);
        let input = self.work_dir.join(format!("{}.input.json", stem));
        let output = self.work_dir.join(format!("{}.outcome.json", stem));
        if output.exists() {
            fs::remove_file(&output).map_err(|e| self.fail("stale outcome", e))?;
        }

        let body = serde_json::to_vec(request).map_err(|e| self.fail("encode input", e))?;
        fs::write(&input, body).map_err(|e| self.fail("write input", e))?;

        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{subject}", request.subject.as_str())
                    .replace("{version}", &request.target_version.to_string())
            })
            .collect();

        info!(program = %self.program, ?args, "starting trainer process");
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| self.fail("spawn", e))?;

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GraphError::RetrainCancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => return Err(self.fail("wait", e)),
            }
        };
        if !status.success() {
            return Err(self.fail("trainer process", status));
        }

        let bytes = fs::read(&output).map_err(|e| self.fail("read outcome", e))?;
        serde_json::from_slice(&bytes).map_err(|e| self.fail("decode outcome", e))
    }
}

// =============================================================================
// SIMILARITY TRAINER
// =============================================================================

/// Predicts, for every hanging node, edges to the `top_k` nodes that share
/// the most non-zero feature values with it. Ties break on node order.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityTrainer {
    top_k: usize,
}

impl SimilarityTrainer {
    #[must_use]
    pub const fn new(top_k: usize) -> Self {
        Self { top_k }
    }
}

impl Default for SimilarityTrainer {
    fn default() -> Self {
        Self::new(DEFAULT_PREDICTION_TOP_K)
    }
}

fn shared_values(a: &[f64], b: &[f64]) -> usize {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.to_bits() == y.to_bits() && x.to_bits() != 0.0f64.to_bits())
        .count()
}

impl Trainer for SimilarityTrainer {
    fn name(&self) -> &str {
        "similarity"
    }

    fn train(
        &self,
        request: &TrainingRequest,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, GraphError> {
        let input = &request.input;
        let mut predicted: Vec<Edge> = Vec::new();

        for h in input.hanging() {
            cancel.check()?;
            let mut scored: Vec<(usize, usize)> = (0..input.node_count())
                .filter(|&o| o != h)
                .map(|o| (shared_values(&input.features[h], &input.features[o]), o))
                .filter(|(score, _)| *score > 0)
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            for (_, o) in scored.into_iter().take(self.top_k) {
                let edge = Edge::new(input.node_ids[h].clone(), input.node_ids[o].clone());
                if !predicted.iter().any(|p| p.same_undirected(&edge)) {
                    predicted.push(edge);
                }
            }
        }

        Ok(TrainingOutcome {
            model_artifact: None,
            predicted_edges: predicted,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::types::{AttrValue, Attributes, NodeId};

    fn request(graph: &Graph) -> TrainingRequest {
        TrainingRequest {
            subject: SubjectId::new("bat").expect("subject"),
            base_version: Some(VersionId(0)),
            target_version: VersionId(1),
            input: TrainingInput::from_graph(graph),
        }
    }

    fn colony_graph() -> Graph {
        let mut graph = Graph::new();
        let node = |sex: &str, roost: &str| {
            let mut a = Attributes::new();
            a.insert("roost".to_string(), AttrValue::from(roost));
            a.insert("sex".to_string(), AttrValue::from(sex));
            a
        };
        graph
            .add_nodes(vec![
                (NodeId::new("a"), node("f", "north")),
                (NodeId::new("b"), node("f", "north")),
                (NodeId::new("c"), node("m", "south")),
                (NodeId::new("d"), node("f", "north")),
            ])
            .expect("nodes");
        graph
            .add_edges(vec![Edge::new("a", "b"), Edge::new("b", "c")])
            .expect("edges");
        graph
    }

    #[test]
    fn similarity_predicts_for_hanging_nodes() {
        let graph = colony_graph();
        let trainer = SimilarityTrainer::new(2);
        let outcome = trainer
            .train(&request(&graph), &CancelToken::new())
            .expect("train");

        assert_eq!(
            outcome.predicted_edges,
            vec![Edge::new("d", "a"), Edge::new("d", "b")]
        );
    }

    #[test]
    fn similarity_respects_cancel() {
        let graph = colony_graph();
        let token = CancelToken::new();
        token.cancel();
        let result = SimilarityTrainer::default().train(&request(&graph), &token);
        assert!(matches!(result, Err(GraphError::RetrainCancelled)));
    }

    #[test]
    fn job_delivers_outcome() {
        let graph = colony_graph();
        let trainer: Arc<dyn Trainer> = Arc::new(|_: &TrainingRequest, _: &CancelToken| -> JobResult {
            Ok(TrainingOutcome {
                model_artifact: Some("m".to_string()),
                predicted_edges: Vec::new(),
            })
        });
        let job = RetrainJob::spawn(trainer, request(&graph)).expect("spawn");
        assert_eq!(job.target(), VersionId(1));
        let outcome = job.wait().expect("outcome");
        assert_eq!(outcome.model_artifact.as_deref(), Some("m"));
    }

    #[test]
    fn job_reports_failure() {
        let graph = colony_graph();
        let trainer: Arc<dyn Trainer> = Arc::new(|_: &TrainingRequest, _: &CancelToken| -> JobResult {
            Err(GraphError::TrainingFailed("diverged".to_string()))
        });
        let job = RetrainJob::spawn(trainer, request(&graph)).expect("spawn");
        assert!(matches!(job.wait(), Err(GraphError::TrainingFailed(_))));
    }

    #[test]
    fn cancelled_job_discards_result() {
        let graph = colony_graph();
        let trainer: Arc<dyn Trainer> = Arc::new(|_: &TrainingRequest, cancel: &CancelToken| -> JobResult {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(TrainingOutcome::default())
        });
        let job = RetrainJob::spawn(trainer, request(&graph)).expect("spawn");
        job.cancel();
        assert!(matches!(job.wait(), Err(GraphError::RetrainCancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn command_trainer_round_trip() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let trainer = CommandTrainer::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"test -s "$1" && printf '{"model_artifact":"%s.model","predicted_edges":[{"source":"d","target":"c"}]}' "$2" > "$3""#
                    .to_string(),
                "trainer".to_string(),
                "{input}".to_string(),
                "{version}".to_string(),
                "{output}".to_string(),
            ],
            dir.path(),
        );
        let outcome = trainer
            .train(&request(&colony_graph()), &CancelToken::new())
            .expect("train");
        assert_eq!(outcome.model_artifact.as_deref(), Some("v1.model"));
        assert_eq!(outcome.predicted_edges, vec![Edge::new("d", "c")]);
    }

    #[cfg(unix)]
    #[test]
    fn command_trainer_failure_is_training_failed() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let trainer = CommandTrainer::new("sh", vec!["-c".to_string(), "exit 3".to_string()], dir.path());
        let result = trainer.train(&request(&colony_graph()), &CancelToken::new());
        assert!(matches!(result, Err(GraphError::TrainingFailed(_))));
    }

    #[test]
    fn command_line_parsing() {
        let argv = vec![
            "python".to_string(),
            "/data/my models/train.py".to_string(),
            "{input}".to_string(),
        ];
        let trainer = CommandTrainer::from_argv(argv, "work").expect("argv");
        assert_eq!(trainer.name(), "python");
        assert_eq!(trainer.args[0], "/data/my models/train.py");

        let trainer = CommandTrainer::from_command_line("  train  --in {input} ", "work").expect("line");
        assert_eq!(trainer.args, vec!["--in".to_string(), "{input}".to_string()]);

        let quoted = CommandTrainer::from_command_line(r#"python "my script.py""#, "work");
        assert!(matches!(quoted, Err(GraphError::Usage(_))));
        assert!(matches!(
            CommandTrainer::from_command_line("   ", "work"),
            Err(GraphError::Usage(_))
        ));
        assert!(matches!(
            CommandTrainer::from_argv(Vec::new(), "work"),
            Err(GraphError::Usage(_))
        ));
    }
}
