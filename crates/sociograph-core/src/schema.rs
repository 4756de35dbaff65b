//! # Attribute Schema
//!
//! Declared attribute kinds for one graph.
//!
//! The schema is inferred once from the loaded graph and then grows as new
//! attribute names are introduced by inserted nodes. Every insert is checked
//! against it, so one attribute name never carries two kinds.
//!
//! Integer and float columns that coexist at inference time are widened to
//! `Float`; an `Int` value is accepted wherever `Float` is declared.

use crate::primitives::{MAX_ATTRIBUTE_NAME_LENGTH, MAX_ATTRIBUTE_VALUE_LENGTH};
use crate::types::{AttrKind, AttrValue, Attributes, GraphError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name -> declared kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeSchema {
    kinds: BTreeMap<String, AttrKind>,
}

impl AttributeSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer a schema from existing node attributes.
    pub fn infer<'a>(nodes: impl IntoIterator<Item = &'a Attributes>) -> Result<Self, GraphError> {
        let mut kinds: BTreeMap<String, AttrKind> = BTreeMap::new();
        for attrs in nodes {
            for (name, value) in attrs {
                let seen = value.kind();
                match kinds.get(name).copied() {
                    None => {
                        kinds.insert(name.clone(), seen);
                    }
                    Some(declared) if declared == seen => {}
                    Some(declared) => {
                        let widened = widen(declared, seen).ok_or_else(|| {
                            GraphError::SchemaViolation(format!(
                                "attribute '{}' holds both {} and {} values",
                                name, declared, seen
                            ))
                        })?;
                        kinds.insert(name.clone(), widened);
                    }
                }
            }
        }
        Ok(Self { kinds })
    }

    /// Declared kind of `name`, if any.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<AttrKind> {
        self.kinds.get(name).copied()
    }

    /// Declared attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, AttrKind)> {
        self.kinds.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Validate the attributes of a node about to be inserted.
    pub fn check(&self, id: &NodeId, attrs: &Attributes) -> Result<(), GraphError> {
        if attrs.is_empty() {
            return Err(GraphError::SchemaViolation(format!(
                "node '{}' has no attributes",
                id
            )));
        }
        for (name, value) in attrs {
            if name.is_empty() || name.len() > MAX_ATTRIBUTE_NAME_LENGTH {
                return Err(GraphError::SchemaViolation(format!(
                    "node '{}': attribute name length must be 1..={}",
                    id, MAX_ATTRIBUTE_NAME_LENGTH
                )));
            }
            match value {
                AttrValue::Str(s) if s.len() > MAX_ATTRIBUTE_VALUE_LENGTH => {
                    return Err(GraphError::SchemaViolation(format!(
                        "node '{}': value of '{}' exceeds {} bytes",
                        id, name, MAX_ATTRIBUTE_VALUE_LENGTH
                    )));
                }
                AttrValue::Float(x) if !x.is_finite() => {
                    return Err(GraphError::SchemaViolation(format!(
                        "node '{}': value of '{}' is not finite",
                        id, name
                    )));
                }
                _ => {}
            }
            if let Some(declared) = self.kind_of(name)
                && !accepts(declared, value.kind())
            {
                return Err(GraphError::SchemaViolation(format!(
                    "node '{}': attribute '{}' is declared {} but got {}",
                    id,
                    name,
                    declared,
                    value.kind()
                )));
            }
        }
        Ok(())
    }

    /// Names in `attrs` that this schema does not declare yet.
    pub fn undeclared<'a>(&'a self, attrs: &'a Attributes) -> impl Iterator<Item = (&'a str, AttrKind)> {
        attrs
            .iter()
            .filter(|(name, _)| !self.kinds.contains_key(name.as_str()))
            .map(|(name, value)| (name.as_str(), value.kind()))
    }

    /// Declare a name. An existing declaration is kept.
    pub fn declare(&mut self, name: impl Into<String>, kind: AttrKind) -> bool {
        let name = name.into();
        if self.kinds.contains_key(&name) {
            return false;
        }
        self.kinds.insert(name, kind);
        true
    }

    /// Drop declarations, used when the insert that introduced them is undone.
    pub(crate) fn retract<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.kinds.remove(name);
        }
    }
}

/// Whether a value of kind `seen` may be stored under `declared`.
///
/// Only widening is allowed: an Int fits a Float attribute, but a Float on
/// an Int attribute is rejected. This is narrower than [`AttributeSchema::infer`],
/// which widens a mixed Int/Float column to Float while loading. Once a name
/// is declared Int, later edits cannot change its kind.
fn accepts(declared: AttrKind, seen: AttrKind) -> bool {
    declared == seen || (declared == AttrKind::Float && seen == AttrKind::Int)
}

fn widen(a: AttrKind, b: AttrKind) -> Option<AttrKind> {
    match (a, b) {
        (AttrKind::Int, AttrKind::Float) | (AttrKind::Float, AttrKind::Int) => Some(AttrKind::Float),
        _ if a == b => Some(a),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
