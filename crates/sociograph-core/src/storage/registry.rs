//! # Version Registry
//!
//! Durable current-version pointers, one per subject, in a redb database.
//!
//! The version directories are the source of truth for which versions
//! exist; the registry only remembers which one is active so a restarted
//! session resumes where the last one left off. Every update is a single
//! ACID write transaction.

use crate::types::{GraphError, SubjectId, VersionId};
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::Path;

/// Table for current pointers: subject -> version ordinal
const CURRENT: TableDefinition<&str, u64> = TableDefinition::new("current_version");

fn io(e: impl std::fmt::Display) -> GraphError {
    GraphError::io("registry", e)
}

/// Handle to the registry database.
pub struct VersionRegistry {
    db: Database,
}

impl std::fmt::Debug for VersionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRegistry").finish_non_exhaustive()
    }
}

impl VersionRegistry {
    /// Open or create the registry at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(io)?;
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(CURRENT).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }
        Ok(Self { db })
    }

    /// Persist the current version of `subject`.
    pub fn set_current(&self, subject: &SubjectId, version: VersionId) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(CURRENT).map_err(io)?;
            table
                .insert(subject.as_str(), version.ordinal())
                .map_err(io)?;
        }
        write_txn.commit().map_err(io)
    }

    /// The persisted current version of `subject`, if any.
    pub fn current(&self, subject: &SubjectId) -> Result<Option<VersionId>, GraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(CURRENT).map_err(io)?;
        Ok(table
            .get(subject.as_str())
            .map_err(io)?
            .map(|v| VersionId(v.value())))
    }
}

// =============================================================================
// TESTS
// =============================================================================
