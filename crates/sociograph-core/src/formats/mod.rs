//! # Formats
//!
//! Checkpoint serialization. Pure transformations, no file I/O.

pub mod persistence;

pub use persistence::{
    CheckpointFormat, CheckpointHeader, CheckpointRecord, MAX_CHECKPOINT_SIZE, state_from_bytes,
    state_to_bytes,
};
