//! # Fixed Constants
//!
//! On-disk names, format versions and input limits for the engine.
//! These are compiled in and never change at runtime.

/// Magic bytes for the binary checkpoint header.
///
/// - File Header = Magic Bytes ("SGCK") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"SGCK";

/// Current checkpoint format version.
///
/// Increment this when making breaking changes to `CheckpointRecord`.
pub const FORMAT_VERSION: u8 = 1;

/// Header length: magic + version byte.
pub const HEADER_LEN: usize = 5;

/// Version of the manifest JSON layout.
pub const MANIFEST_VERSION: u32 = 1;

// =============================================================================
// ON-DISK LAYOUT
// =============================================================================

/// Immutable snapshot written when a version is created.
pub const CHECKPOINT_FILE: &str = "checkpoint.sgck";

/// Mutable slot rewritten by `Save`.
pub const SESSION_FILE: &str = "session.sgck";

/// Per-version metadata record.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Registry database holding the current-version pointer of every subject.
pub const REGISTRY_FILE: &str = "registry.redb";

/// Prefix of version directory names (`v0`, `v1`, ...).
pub const VERSION_PREFIX: char = 'v';

/// Marker in the name of hidden in-progress version directories.
pub const PARTIAL_MARKER: &str = ".partial-";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum checkpoint file size accepted before decoding (256 MB).
pub const MAX_CHECKPOINT_SIZE: usize = 256 * 1024 * 1024;

/// Maximum length of a node id.
pub const MAX_NODE_ID_LENGTH: usize = 256;

/// Maximum length of an attribute name.
pub const MAX_ATTRIBUTE_NAME_LENGTH: usize = 256;

/// Maximum length of a string attribute value (64 KB).
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 64 * 1024;

/// Default number of predicted partners per hanging node.
pub const DEFAULT_PREDICTION_TOP_K: usize = 3;
