//! # Graph Source Loader
//!
//! Reads a node-link JSON document into a [`GraphState`]:
//!
//! ```json
//! {"nodes": [{"id": "a", "sex": "f", "age": 3}],
//!  "links": [{"source": "a", "target": "b"}]}
//! ```
//!
//! - Numeric ids are stringified
//! - `"edges"` is accepted in place of `"links"`
//! - Nodes without attributes are pruned
//! - Links to unknown or pruned nodes, and repeated links, are dropped
//!
//! Every prune or drop is logged and listed in the returned [`LoadReport`].

use crate::graph::GraphState;
use crate::primitives::MAX_NODE_ID_LENGTH;
use crate::schema::AttributeSchema;
use crate::types::{AttrKind, AttrValue, Attributes, Edge, GraphError, NodeId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

/// What the loader removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub pruned_nodes: Vec<NodeId>,
    pub dropped_links: Vec<Edge>,
}

/// Load a node-link document from a file.
pub fn load_node_link_file(path: impl AsRef<Path>) -> Result<(GraphState, LoadReport), GraphError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| GraphError::io(path.display(), e))?;
    load_node_link(&bytes)
}

/// Load a node-link document.
pub fn load_node_link(bytes: &[u8]) -> Result<(GraphState, LoadReport), GraphError> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| GraphError::Serialization(format!("node-link JSON: {}", e)))?;
    let root = doc
        .as_object()
        .ok_or_else(|| GraphError::SchemaViolation("node-link root must be an object".to_string()))?;
    let raw_nodes = root
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| GraphError::SchemaViolation("missing \"nodes\" array".to_string()))?;

    let mut report = LoadReport::default();
    let mut nodes: BTreeMap<NodeId, Attributes> = BTreeMap::new();
    for raw in raw_nodes {
        let object = raw
            .as_object()
            .ok_or_else(|| GraphError::SchemaViolation("node entries must be objects".to_string()))?;
        let id = object
            .get("id")
            .map(id_from_json)
            .transpose()?
            .ok_or_else(|| GraphError::SchemaViolation("node without \"id\"".to_string()))?;

        let mut attrs = Attributes::new();
        for (name, value) in object.iter().filter(|(k, _)| k.as_str() != "id") {
            if let Some(v) = attr_from_json(name, value, None)? {
                attrs.insert(name.clone(), v);
            }
        }

        if attrs.is_empty() {
            warn!(node = %id, "node has no attributes, pruning");
            report.pruned_nodes.push(id);
            continue;
        }
        if nodes.insert(id.clone(), attrs).is_some() {
            return Err(GraphError::DuplicateEntity(format!("node '{}' listed twice", id)));
        }
    }

    let schema = AttributeSchema::infer(nodes.values())?;

    let raw_links = root
        .get("links")
        .or_else(|| root.get("edges"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut edges: BTreeSet<Edge> = BTreeSet::new();
    for raw in raw_links {
        let endpoint = |key: &str| raw.get(key).map(id_from_json).transpose();
        let (Some(source), Some(target)) = (endpoint("source")?, endpoint("target")?) else {
            return Err(GraphError::SchemaViolation(
                "link without source or target".to_string(),
            ));
        };
        let edge = Edge::new(source, target);
        if !nodes.contains_key(&edge.source) || !nodes.contains_key(&edge.target) {
            warn!(edge = %edge, "link references an unknown node, dropping");
            report.dropped_links.push(edge);
            continue;
        }
        if edges.contains(&edge) || edges.contains(&edge.reversed()) {
            warn!(edge = %edge, "repeated link, dropping");
            report.dropped_links.push(edge);
            continue;
        }
        edges.insert(edge);
    }

    info!(
        nodes = nodes.len(),
        edges = edges.len(),
        pruned = report.pruned_nodes.len(),
        dropped = report.dropped_links.len(),
        "graph source loaded"
    );
    Ok((GraphState::from_parts(nodes, edges, schema), report))
}

fn id_from_json(value: &Value) -> Result<NodeId, GraphError> {
    let id = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(GraphError::SchemaViolation(format!(
                "node id must be a string or number, got {}",
                other
            )));
        }
    };
    if id.is_empty() || id.len() > MAX_NODE_ID_LENGTH {
        return Err(GraphError::SchemaViolation(format!(
            "node id length must be 1..={}",
            MAX_NODE_ID_LENGTH
        )));
    }
    Ok(NodeId(id))
}

/// Convert a JSON value into an attribute value, guided by a declared kind.
///
/// `null` yields `None` (the attribute is absent). Strings are parsed when
/// the declared kind is numeric, numbers are rendered when it is `Str`.
pub fn attr_from_json(
    name: &str,
    value: &Value,
    declared: Option<AttrKind>,
) -> Result<Option<AttrValue>, GraphError> {
    let mismatch = || {
        GraphError::SchemaViolation(format!(
            "attribute '{}': cannot use {} as {}",
            name,
            value,
            declared.map_or_else(|| "a value".to_string(), |k| k.to_string())
        ))
    };
    let converted = match (value, declared) {
        (Value::Null, _) => return Ok(None),
        (Value::String(s), Some(AttrKind::Int)) => {
            AttrValue::Int(s.trim().parse().map_err(|_| mismatch())?)
        }
        (Value::String(s), Some(AttrKind::Float)) => {
            AttrValue::Float(s.trim().parse().map_err(|_| mismatch())?)
        }
        (Value::String(s), _) => AttrValue::Str(s.clone()),
        (Value::Bool(b), _) => AttrValue::Str(b.to_string()),
        (Value::Number(n), Some(AttrKind::Str)) => AttrValue::Str(n.to_string()),
        (Value::Number(n), Some(AttrKind::Float)) => {
            AttrValue::Float(n.as_f64().ok_or_else(mismatch)?)
        }
        (Value::Number(n), _) => match n.as_i64() {
            Some(i) => AttrValue::Int(i),
            None => AttrValue::Float(n.as_f64().ok_or_else(mismatch)?),
        },
        (Value::Array(_) | Value::Object(_), _) => return Err(mismatch()),
    };
    Ok(Some(converted))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(doc: &Value) -> (GraphState, LoadReport) {
        load_node_link(&serde_json::to_vec(doc).expect("encode")).expect("load")
    }

    #[test]
    fn loads_nodes_links_and_schema() {
        let (state, report) = load(&json!({
            "directed": false,
            "nodes": [
                {"id": 1, "sex": "f", "age": 3},
                {"id": 2, "sex": "m", "age": 4.5},
                {"id": "x", "sex": "f"}
            ],
            "links": [{"source": 1, "target": 2}, {"source": "x", "target": 1}]
        }));

        assert_eq!(state.node_count(), 3);
        assert_eq!(state.edge_count(), 2);
        assert_eq!(state.schema().kind_of("age"), Some(AttrKind::Float));
        assert_eq!(state.schema().kind_of("sex"), Some(AttrKind::Str));
        assert!(state.selection().is_empty());
        assert_eq!(report, LoadReport::default());
    }

    #[test]
    fn prunes_degenerate_nodes_and_their_links() {
        let (state, report) = load(&json!({
            "nodes": [{"id": "a", "sex": "f"}, {"id": "b"}, {"id": "c", "sex": "m", "tag": null}],
            "edges": [{"source": "a", "target": "b"}, {"source": "a", "target": "c"}]
        }));

        assert_eq!(report.pruned_nodes, vec![NodeId::new("b")]);
        assert_eq!(report.dropped_links, vec![Edge::new("a", "b")]);
        assert_eq!(state.node_count(), 2);
        assert_eq!(state.edge_count(), 1);
        state.check_consistency().expect("consistent");
    }

    #[test]
    fn drops_reverse_duplicate_links() {
        let (state, report) = load(&json!({
            "nodes": [{"id": "a", "k": 1}, {"id": "b", "k": 2}],
            "links": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
        }));
        assert_eq!(state.edge_count(), 1);
        assert_eq!(report.dropped_links.len(), 1);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(load_node_link(b"[]").is_err());
        assert!(load_node_link(b"{\"links\": []}").is_err());
        assert!(load_node_link(b"{\"nodes\": [{\"sex\": \"f\"}]}").is_err());
        assert!(matches!(
            load_node_link(b"{\"nodes\": [{\"id\": \"a\", \"k\": 1}, {\"id\": \"a\", \"k\": 2}]}"),
            Err(GraphError::DuplicateEntity(_))
        ));
    }

    #[test]
    fn attr_conversion_follows_declared_kind() {
        let v = |x: Value, k| attr_from_json("a", &x, k).expect("convert");
        assert_eq!(v(json!("7"), Some(AttrKind::Int)), Some(AttrValue::Int(7)));
        assert_eq!(v(json!(7), Some(AttrKind::Str)), Some(AttrValue::Str("7".into())));
        assert_eq!(v(json!(7), Some(AttrKind::Float)), Some(AttrValue::Float(7.0)));
        assert_eq!(v(json!(7), None), Some(AttrValue::Int(7)));
        assert_eq!(v(json!(null), None), None);
        assert!(attr_from_json("a", &json!("seven"), Some(AttrKind::Int)).is_err());
        assert!(attr_from_json("a", &json!([1]), None).is_err());
    }
}
