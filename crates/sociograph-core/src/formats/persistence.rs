//! # Checkpoint Format
//!
//! Serialization of a [`GraphState`] into a checkpoint file body.
//!
//! Binary format: Header (5 bytes) + postcard-serialized `CheckpointRecord`.
//! - 4 bytes: Magic ("SGCK")
//! - 1 byte: Version
//!
//! JSON format: the same `CheckpointRecord`, pretty-printed. Readers detect
//! the encoding from the magic bytes, so either can be loaded regardless of
//! the configured write format.
//!
//! Size is validated before any payload is decoded.

use crate::graph::GraphState;
use crate::primitives::{self, HEADER_LEN};
use crate::types::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::primitives::MAX_CHECKPOINT_SIZE;

// =============================================================================
// RECORD
// =============================================================================

/// Tagged, versioned checkpoint body. New layouts get a new variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckpointRecord {
    V1(GraphState),
}

impl CheckpointRecord {
    #[must_use]
    pub fn into_state(self) -> GraphState {
        match self {
            CheckpointRecord::V1(state) => state,
        }
    }
}

/// On-disk encoding chosen for new checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointFormat {
    #[default]
    Binary,
    Json,
}

impl fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointFormat::Binary => f.write_str("binary"),
            CheckpointFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for CheckpointFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "postcard" => Ok(CheckpointFormat::Binary),
            "json" => Ok(CheckpointFormat::Json),
            other => Err(GraphError::Serialization(format!(
                "unknown checkpoint format '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes binary checkpoint data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl CheckpointHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GraphError::Serialization("invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GraphError::Serialization(format!(
                "unsupported checkpoint version {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let head = bytes
            .get(..HEADER_LEN)
            .ok_or_else(|| GraphError::Serialization("header too short".to_string()))?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for CheckpointHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode a graph state in the given format.
pub fn state_to_bytes(state: &GraphState, format: CheckpointFormat) -> Result<Vec<u8>, GraphError> {
    let record = CheckpointRecord::V1(state.clone());
    match format {
        CheckpointFormat::Binary => {
            let payload = postcard::to_stdvec(&record)
                .map_err(|e| GraphError::Serialization(e.to_string()))?;
            let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
            out.extend_from_slice(&CheckpointHeader::new().to_bytes());
            out.extend_from_slice(&payload);
            Ok(out)
        }
        CheckpointFormat::Json => serde_json::to_vec_pretty(&record)
            .map_err(|e| GraphError::Serialization(e.to_string())),
    }
}

/// Decode a checkpoint body in either format.
pub fn state_from_bytes(bytes: &[u8]) -> Result<GraphState, GraphError> {
    if bytes.len() > MAX_CHECKPOINT_SIZE {
        return Err(GraphError::Serialization(format!(
            "checkpoint of {} bytes exceeds maximum of {} bytes",
            bytes.len(),
            MAX_CHECKPOINT_SIZE
        )));
    }

    let record: CheckpointRecord = if bytes.starts_with(primitives::MAGIC_BYTES) {
        let header = CheckpointHeader::from_bytes(bytes)?;
        header.validate()?;
        postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
            GraphError::Serialization(format!("failed to decode checkpoint: {}", e))
        })?
    } else {
        serde_json::from_slice(bytes).map_err(|e| {
            GraphError::Serialization(format!("failed to decode JSON checkpoint: {}", e))
        })?
    };
    Ok(record.into_state())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::types::{AttrValue, Attributes, Edge, NodeId, Position};

    fn sample() -> GraphState {
        let mut graph = Graph::new();
        let mut a = Attributes::new();
        a.insert("sex".to_string(), AttrValue::from("f"));
        a.insert("weight".to_string(), AttrValue::Float(12.5));
        let mut b = Attributes::new();
        b.insert("sex".to_string(), AttrValue::from("m"));
        b.insert("weight".to_string(), AttrValue::Int(9));
        graph
            .add_nodes(vec![(NodeId::new("a"), a), (NodeId::new("b"), b)])
            .expect("nodes");
        graph.add_edges(vec![Edge::new("b", "a")]).expect("edge");
        graph
            .set_position(&NodeId::new("a"), Position::new(0.25, -1.0))
            .expect("pos");
        graph.state().clone()
    }

    #[test]
    fn header_roundtrip() {
        let header = CheckpointHeader::new();
        let restored = CheckpointHeader::from_bytes(&header.to_bytes()).expect("parse");
        assert_eq!(restored, header);
        restored.validate().expect("valid");
    }

    #[test]
    fn binary_roundtrip_is_bit_exact() {
        let state = sample();
        let bytes1 = state_to_bytes(&state, CheckpointFormat::Binary).expect("encode");
        let restored = state_from_bytes(&bytes1).expect("decode");
        assert_eq!(restored, state);

        let bytes2 = state_to_bytes(&restored, CheckpointFormat::Binary).expect("encode");
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn json_is_detected_without_header() {
        let state = sample();
        let bytes = state_to_bytes(&state, CheckpointFormat::Json).expect("encode");
        assert!(!bytes.starts_with(primitives::MAGIC_BYTES));
        assert_eq!(state_from_bytes(&bytes).expect("decode"), state);
    }

    #[test]
    fn wrong_version_rejected() {
        let mut bytes = state_to_bytes(&sample(), CheckpointFormat::Binary).expect("encode");
        bytes[4] = 99;
        assert!(matches!(
            state_from_bytes(&bytes),
            Err(GraphError::Serialization(_))
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(state_from_bytes(b"SGC").is_err());
        assert!(state_from_bytes(b"not a checkpoint").is_err());
    }

    #[test]
    fn format_parse() {
        assert_eq!("json".parse::<CheckpointFormat>().expect("json"), CheckpointFormat::Json);
        assert_eq!("Binary".parse::<CheckpointFormat>().expect("bin"), CheckpointFormat::Binary);
        assert!("xml".parse::<CheckpointFormat>().is_err());
    }
}
