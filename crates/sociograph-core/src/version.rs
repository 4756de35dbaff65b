//! # Version Manager
//!
//! Monotonically numbered, immutable checkpoints per subject.
//!
//! ## Layout
//!
//! ```text
//! {root}/registry.redb              current-version pointer per subject
//! {root}/{subject}/v{n}/
//!     checkpoint.sgck               snapshot written when the version is created
//!     manifest.json                 provenance record
//!     session.sgck                  optional, rewritten by Save
//! ```
//!
//! ## Guarantees
//!
//! - A version directory only appears once all of its files are written and
//!   synced: files go into a hidden `.v{n}.partial-{pid}` directory first and
//!   the directory is renamed into place.
//! - Hidden and partial entries are never counted, so an interrupted write
//!   cannot shift numbering.
//! - Allocation returns `v{max(count, highest + 1)}`, which is `v{count}` for
//!   a contiguous history and never collides with an existing version.
//! - `checkpoint.sgck` is never rewritten.

use crate::formats::{CheckpointFormat, state_from_bytes, state_to_bytes};
use crate::graph::GraphState;
use crate::primitives::{
    CHECKPOINT_FILE, MANIFEST_FILE, MANIFEST_VERSION, MAX_CHECKPOINT_SIZE, PARTIAL_MARKER,
    REGISTRY_FILE, SESSION_FILE,
};
use crate::storage::VersionRegistry;
use crate::training::TrainingOutcome;
use crate::types::{Edge, GraphError, SubjectId, VersionId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// SESSION CONTEXT
// =============================================================================

/// Which subject is being edited, which versions it has and which is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    subject: SubjectId,
    versions: Vec<VersionId>,
    current: Option<VersionId>,
}

impl SessionContext {
    /// Context for a subject with no versions yet.
    #[must_use]
    pub fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            versions: Vec::new(),
            current: None,
        }
    }

    #[must_use]
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Known versions in ascending order.
    #[must_use]
    pub fn versions(&self) -> &[VersionId] {
        &self.versions
    }

    #[must_use]
    pub fn current(&self) -> Option<VersionId> {
        self.current
    }

    fn record(&mut self, version: VersionId) {
        if let Err(index) = self.versions.binary_search(&version) {
            self.versions.insert(index, version);
        }
        self.current = Some(version);
    }
}

// =============================================================================
// MANIFEST
// =============================================================================

/// How a version came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrigin {
    Bootstrap,
    Retrain,
}

/// Provenance stored beside every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub format_version: u32,
    pub subject: SubjectId,
    pub version: VersionId,
    pub parent: Option<VersionId>,
    pub origin: VersionOrigin,
    pub checkpoint_format: CheckpointFormat,
    pub node_count: usize,
    pub edge_count: usize,
    pub trainer: Option<String>,
    pub model_artifact: Option<String>,
    pub predicted_edges: Vec<Edge>,
}

impl VersionManifest {
    fn bootstrap(
        subject: &SubjectId,
        version: VersionId,
        format: CheckpointFormat,
        state: &GraphState,
    ) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            subject: subject.clone(),
            version,
            parent: None,
            origin: VersionOrigin::Bootstrap,
            checkpoint_format: format,
            node_count: state.node_count(),
            edge_count: state.edge_count(),
            trainer: None,
            model_artifact: None,
            predicted_edges: Vec::new(),
        }
    }
}

// =============================================================================
// VERSION MANAGER
// =============================================================================

/// Owns the version root and the registry.
#[derive(Debug)]
pub struct VersionManager {
    root: PathBuf,
    format: CheckpointFormat,
    registry: VersionRegistry,
}

impl VersionManager {
    /// Open (creating if needed) a version root.
    pub fn open(root: impl Into<PathBuf>, format: CheckpointFormat) -> Result<Self, GraphError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| GraphError::io(root.display(), e))?;
        let registry = VersionRegistry::open(root.join(REGISTRY_FILE))?;
        Ok(Self {
            root,
            format,
            registry,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn format(&self) -> CheckpointFormat {
        self.format
    }

    #[must_use]
    pub fn subject_dir(&self, subject: &SubjectId) -> PathBuf {
        self.root.join(subject.as_str())
    }

    #[must_use]
    pub fn version_dir(&self, subject: &SubjectId, version: VersionId) -> PathBuf {
        self.subject_dir(subject).join(version.to_string())
    }

    // ===== DISCOVERY =====

    /// Completed versions of `subject`, ascending. Partial and hidden entries are skipped.
    pub fn list_versions(&self, subject: &SubjectId) -> Result<Vec<VersionId>, GraphError> {
        let dir = self.subject_dir(subject);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| GraphError::io(dir.display(), e))? {
            let entry = entry.map_err(|e| GraphError::io(dir.display(), e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(version) = name.parse::<VersionId>() else {
                continue;
            };
            let is_dir = entry
                .file_type()
                .map_err(|e| GraphError::io(entry.path().display(), e))?
                .is_dir();
            if is_dir {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Next unused version id for `subject`.
    pub fn allocate_version(&self, subject: &SubjectId) -> Result<VersionId, GraphError> {
        let versions = self.list_versions(subject)?;
        let count = versions.len() as u64;
        let after_highest = versions.last().map_or(0, |v| v.ordinal().saturating_add(1));
        Ok(VersionId(count.max(after_highest)))
    }

    /// Build a context from the directory scan and the registry pointer.
    ///
    /// Falls back to the highest version when the pointer is missing or stale.
    pub fn open_session(&self, subject: &SubjectId) -> Result<SessionContext, GraphError> {
        let versions = self.list_versions(subject)?;
        let pointer = self.registry.current(subject)?;
        let current = match pointer {
            Some(v) if versions.contains(&v) => Some(v),
            Some(v) => {
                warn!(subject = %subject, version = %v, "registry points at a missing version, using highest");
                versions.last().copied()
            }
            None => versions.last().copied(),
        };
        Ok(SessionContext {
            subject: subject.clone(),
            versions,
            current,
        })
    }

    // ===== WRITES =====

    /// Write a new immutable version directory.
    pub fn checkpoint(
        &self,
        subject: &SubjectId,
        version: VersionId,
        state: &GraphState,
        manifest: &VersionManifest,
    ) -> Result<PathBuf, GraphError> {
        let subject_dir = self.subject_dir(subject);
        fs::create_dir_all(&subject_dir).map_err(|e| GraphError::io(subject_dir.display(), e))?;

        let target = subject_dir.join(version.to_string());
        if target.exists() {
            return Err(GraphError::IoFailure(format!(
                "version {} of '{}' already exists",
                version, subject
            )));
        }

        let temp = subject_dir.join(format!(
            ".{}{}{}",
            version,
            PARTIAL_MARKER,
            std::process::id()
        ));
        if temp.exists() {
            fs::remove_dir_all(&temp).map_err(|e| GraphError::io(temp.display(), e))?;
        }

        let body = state_to_bytes(state, self.format)?;
        let mut manifest = manifest.clone();
        manifest.checkpoint_format = self.format;
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let written = write_partial(&temp, &target, &[
            (CHECKPOINT_FILE, body.as_slice()),
            (MANIFEST_FILE, manifest_json.as_slice()),
        ]);

        if let Err(e) = written {
            let _ = fs::remove_dir_all(&temp);
            return Err(e);
        }
        sync_dir(&subject_dir);

        info!(subject = %subject, version = %version, nodes = state.node_count(), "checkpoint written");
        Ok(target)
    }

    /// Atomically replace the session slot of the current version.
    pub fn save(&self, context: &SessionContext, state: &GraphState) -> Result<PathBuf, GraphError> {
        let version = context
            .current
            .ok_or_else(|| GraphError::UnknownVersion("no active version".to_string()))?;
        let dir = self.version_dir(&context.subject, version);
        if !dir.is_dir() {
            return Err(GraphError::UnknownVersion(version.to_string()));
        }

        let body = state_to_bytes(state, self.format)?;
        let path = dir.join(SESSION_FILE);
        let temp = dir.join(format!(".{}.tmp-{}", SESSION_FILE, std::process::id()));
        let written = write_synced(&temp, &body)
            .and_then(|()| fs::rename(&temp, &path).map_err(|e| GraphError::io(path.display(), e)));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        sync_dir(&dir);
        Ok(path)
    }

    /// Make `version` current and persist the pointer.
    pub fn activate(&self, context: &mut SessionContext, version: VersionId) -> Result<(), GraphError> {
        if !self.version_dir(&context.subject, version).is_dir() {
            return Err(GraphError::UnknownVersion(version.to_string()));
        }
        self.registry.set_current(&context.subject, version)?;
        context.record(version);
        info!(subject = %context.subject, version = %version, "version activated");
        Ok(())
    }

    /// Write the first version of a subject that has none.
    pub fn bootstrap(&self, context: &mut SessionContext, state: &GraphState) -> Result<VersionId, GraphError> {
        let existing = self.list_versions(&context.subject)?;
        if !existing.is_empty() {
            return Err(GraphError::DuplicateEntity(format!(
                "subject '{}' already has {} version(s)",
                context.subject,
                existing.len()
            )));
        }
        let version = self.allocate_version(&context.subject)?;
        let manifest = VersionManifest::bootstrap(&context.subject, version, self.format, state);
        self.checkpoint(&context.subject, version, state, &manifest)?;
        self.activate(context, version)?;
        Ok(version)
    }

    /// Persist the outcome of a retrain as a new active version.
    ///
    /// On any failure no version is left behind or activated.
    pub fn commit_retrain(
        &self,
        context: &mut SessionContext,
        state: &GraphState,
        trainer: &str,
        outcome: &TrainingOutcome,
    ) -> Result<VersionId, GraphError> {
        let version = self.allocate_version(&context.subject)?;
        let manifest = VersionManifest {
            format_version: MANIFEST_VERSION,
            subject: context.subject.clone(),
            version,
            parent: context.current,
            origin: VersionOrigin::Retrain,
            checkpoint_format: self.format,
            node_count: state.node_count(),
            edge_count: state.edge_count(),
            trainer: Some(trainer.to_string()),
            model_artifact: outcome.model_artifact.clone(),
            predicted_edges: outcome.predicted_edges.clone(),
        };
        let dir = self.checkpoint(&context.subject, version, state, &manifest)?;
        if let Err(e) = self.activate(context, version) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }
        Ok(version)
    }

    // ===== READS =====

    /// Load a version, preferring its saved session over the original snapshot.
    pub fn load(&self, subject: &SubjectId, version: VersionId) -> Result<GraphState, GraphError> {
        let dir = self.version_dir(subject, version);
        if !dir.is_dir() {
            return Err(GraphError::UnknownVersion(version.to_string()));
        }
        let session = dir.join(SESSION_FILE);
        let path = if session.is_file() {
            session
        } else {
            dir.join(CHECKPOINT_FILE)
        };
        read_checkpoint(&path)
    }

    /// Load the immutable snapshot of a version, ignoring any saved session.
    pub fn load_snapshot(&self, subject: &SubjectId, version: VersionId) -> Result<GraphState, GraphError> {
        let dir = self.version_dir(subject, version);
        if !dir.is_dir() {
            return Err(GraphError::UnknownVersion(version.to_string()));
        }
        read_checkpoint(&dir.join(CHECKPOINT_FILE))
    }

    /// Read the manifest of a version.
    pub fn manifest(&self, subject: &SubjectId, version: VersionId) -> Result<VersionManifest, GraphError> {
        let path = self.version_dir(subject, version).join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(GraphError::UnknownVersion(version.to_string()));
        }
        let bytes = fs::read(&path).map_err(|e| GraphError::io(path.display(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| GraphError::Serialization(e.to_string()))
    }
}

fn read_checkpoint(path: &Path) -> Result<GraphState, GraphError> {
    let len = fs::metadata(path)
        .map_err(|e| GraphError::io(path.display(), e))?
        .len();
    if len > MAX_CHECKPOINT_SIZE as u64 {
        return Err(GraphError::Serialization(format!(
            "{} is {} bytes, limit is {}",
            path.display(),
            len,
            MAX_CHECKPOINT_SIZE
        )));
    }
    let bytes = fs::read(path).map_err(|e| GraphError::io(path.display(), e))?;
    state_from_bytes(&bytes)
}

/// Fill `temp` with `files` and rename it to `target`.
fn write_partial(temp: &Path, target: &Path, files: &[(&str, &[u8])]) -> Result<(), GraphError> {
    fs::create_dir(temp).map_err(|e| GraphError::io(temp.display(), e))?;
    for (name, bytes) in files {
        write_synced(&temp.join(name), bytes)?;
    }
    if target.exists() {
        return Err(GraphError::IoFailure(format!(
            "{} was created concurrently",
            target.display()
        )));
    }
    fs::rename(temp, target).map_err(|e| GraphError::io(target.display(), e))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), GraphError> {
    let mut file = File::create(path).map_err(|e| GraphError::io(path.display(), e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| GraphError::io(path.display(), e))
}

/// Best effort: some platforms cannot open directories for syncing.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
}

// =============================================================================
// TESTS
// =============================================================================
