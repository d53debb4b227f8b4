//! Nested document shared by the extraction and transform engines.
//!
//! A [`ResultTree`] mirrors the store hierarchy: every path segment becomes a
//! mapping key and every leaf's key/value pairs become a mapping placed at the
//! leaf's path. Keys are kept sorted so that serializing the same tree always
//! produces the same bytes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// A position in the document: either a nested mapping or an opaque value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Tree(ResultTree),
    Value(Value),
}

impl Node {
    /// Build a leaf node from a store's key/value pairs.
    pub fn leaf(values: Map<String, Value>) -> Self {
        Node::Tree(ResultTree::from_map(values))
    }

    /// Check if this node is a nested mapping.
    pub fn is_tree(&self) -> bool {
        matches!(self, Node::Tree(_))
    }

    /// Borrow the nested mapping, if any.
    pub fn as_tree(&self) -> Option<&ResultTree> {
        match self {
            Node::Tree(tree) => Some(tree),
            Node::Value(_) => None,
        }
    }

    /// Convert into a plain JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Tree(tree) => tree.to_value(),
            Node::Value(value) => value.clone(),
        }
    }
}

impl From<Value> for Node {
    /// JSON objects become nested trees so locators can descend into them.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Node::Tree(ResultTree::from_map(map)),
            other => Node::Value(other),
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Node::from)
    }
}

/// Ordered nested mapping keyed by path segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultTree {
    entries: BTreeMap<String, Node>,
}

impl ResultTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        let entries = map
            .into_iter()
            .map(|(key, value)| (key, Node::from(value)))
            .collect();
        Self { entries }
    }

    /// Convert into a JSON object value.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(key, node)| (key.clone(), node.to_value()))
            .collect();
        Value::Object(map)
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a direct entry.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }

    /// Insert a direct entry, returning the replaced node.
    pub fn insert(&mut self, key: impl Into<String>, node: Node) -> Option<Node> {
        self.entries.insert(key.into(), node)
    }

    /// Remove a direct entry.
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        self.entries.remove(key)
    }

    /// Iterate over direct entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.entries.iter()
    }

    /// Resolve a nested position.
    ///
    /// Returns `Ok(None)` when any segment is missing.
    ///
    /// # Errors
    /// - `ShapeMismatch` if an intermediate segment holds a non-mapping value
    /// - `InvalidInput` if `segments` is empty
    pub fn get_at(&self, segments: &[String]) -> Result<Option<&Node>> {
        let (last, parents) = split_segments(segments)?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            match current.entries.get(segment) {
                Some(Node::Tree(tree)) => current = tree,
                Some(Node::Value(_)) => return Err(shape_mismatch(&segments[..=depth])),
                None => return Ok(None),
            }
        }

        Ok(current.entries.get(last))
    }

    /// Insert or overwrite a nested position, creating intermediate
    /// mappings on demand. Returns the replaced node.
    ///
    /// # Errors
    /// - `ShapeMismatch` if an intermediate segment holds a non-mapping value
    /// - `InvalidInput` if `segments` is empty
    pub fn insert_at(&mut self, segments: &[String], node: Node) -> Result<Option<Node>> {
        let (last, parents) = split_segments(segments)?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            current = match current
                .entries
                .entry(segment.clone())
                .or_insert_with(|| Node::Tree(ResultTree::new()))
            {
                Node::Tree(tree) => tree,
                Node::Value(_) => return Err(shape_mismatch(&segments[..=depth])),
            };
        }

        Ok(current.entries.insert(last.clone(), node))
    }

    /// Remove a nested position.
    ///
    /// Ancestors emptied by the removal are pruned as well; mappings that
    /// were already empty elsewhere in the tree are left alone.
    ///
    /// # Errors
    /// - `ShapeMismatch` if an intermediate segment holds a non-mapping value
    /// - `InvalidInput` if `segments` is empty
    pub fn remove_at(&mut self, segments: &[String]) -> Result<Option<Node>> {
        split_segments(segments)?;
        self.remove_at_depth(segments, 0)
    }

    fn remove_at_depth(&mut self, segments: &[String], depth: usize) -> Result<Option<Node>> {
        let key = &segments[depth];
        if depth + 1 == segments.len() {
            return Ok(self.entries.remove(key));
        }

        let removed = match self.entries.get_mut(key) {
            Some(Node::Tree(child)) => child.remove_at_depth(segments, depth + 1)?,
            Some(Node::Value(_)) => return Err(shape_mismatch(&segments[..=depth])),
            None => return Ok(None),
        };

        if removed.is_some() && matches!(self.entries.get(key), Some(Node::Tree(t)) if t.is_empty())
        {
            self.entries.remove(key);
        }

        Ok(removed)
    }

    /// Deep-merge `other` into this tree. Mappings present on both sides are
    /// merged recursively; anything else from `other` wins.
    pub fn merge(&mut self, other: ResultTree) {
        for (key, incoming) in other.entries {
            match incoming {
                Node::Tree(subtree) => match self.entries.get_mut(&key) {
                    Some(Node::Tree(existing)) => existing.merge(subtree),
                    _ => {
                        self.entries.insert(key, Node::Tree(subtree));
                    }
                },
                value => {
                    self.entries.insert(key, value);
                }
            }
        }
    }

    /// Collapse nested mappings into a single level whose keys are the
    /// nested key paths joined with `separator`. Empty mappings are kept as
    /// values under their joined key.
    ///
    /// # Errors
    /// - `ShapeMismatch` if two distinct key paths join to the same key
    pub fn flatten(&self, separator: &str) -> Result<ResultTree> {
        let mut flat = ResultTree::new();
        self.flatten_into(None, separator, &mut flat)?;
        Ok(flat)
    }

    fn flatten_into(
        &self,
        prefix: Option<&str>,
        separator: &str,
        out: &mut ResultTree,
    ) -> Result<()> {
        for (key, node) in &self.entries {
            let name = match prefix {
                Some(prefix) => format!("{prefix}{separator}{key}"),
                None => key.clone(),
            };
            match node {
                Node::Tree(tree) if !tree.is_empty() => {
                    tree.flatten_into(Some(&name), separator, out)?
                }
                other => {
                    if out.entries.contains_key(&name) {
                        return Err(Error::ShapeMismatch(format!(
                            "flattened key '{name}' is produced by more than one entry"
                        )));
                    }
                    out.entries.insert(name, other.clone());
                }
            }
        }
        Ok(())
    }

    /// Count the opaque values stored anywhere in the tree.
    pub fn count_values(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                Node::Tree(tree) => tree.count_values(),
                Node::Value(_) => 1,
            })
            .sum()
    }
}

impl<'de> Deserialize<'de> for ResultTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(ResultTree::from_map)
    }
}

impl From<Map<String, Value>> for ResultTree {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

fn split_segments(segments: &[String]) -> Result<(&String, &[String])> {
    segments
        .split_last()
        .ok_or_else(|| Error::InvalidInput("Position must have at least one segment".to_string()))
}

fn shape_mismatch(prefix: &[String]) -> Error {
    Error::ShapeMismatch(format!("'{}' is not a mapping", prefix.join(".")))
}
