//! Rooted view over an export's node mapping.

use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One node of the export mapping.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExportNode {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Export mapping with its single root resolved.
///
/// Only the active path (first child at every level) is ever read; other
/// branches stay in `nodes` but are unreachable through this type.
#[derive(Debug, Clone)]
pub struct ExportTree {
    root: String,
    nodes: HashMap<String, ExportNode>,
}

impl ExportTree {
    /// Build a tree from a raw mapping; `None` when no node is parentless.
    pub fn from_mapping(mapping: &Map<String, Value>) -> Option<Self> {
        let mut nodes = HashMap::with_capacity(mapping.len());
        let mut root = None;
        for (id, raw) in mapping {
            let mut node = match ExportNode::deserialize(raw) {
                Ok(node) => node,
                Err(err) => {
                    debug!("skipping malformed export node (id={}, error={})", id, err);
                    continue;
                }
            };
            node.id = id.clone();
            if node.parent.is_none() && root.is_none() {
                root = Some(id.clone());
            }
            nodes.insert(id.clone(), node);
        }
        Some(Self { root: root?, nodes })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes from the root following child index 0 until a leaf.
    ///
    /// Stops early at a dangling child reference and never revisits a node.
    pub fn active_path(&self) -> Vec<&ExportNode> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.root.as_str());
        while let Some(id) = current {
            if !seen.insert(id) {
                debug!("export path revisits a node, stopping (id={})", id);
                break;
            }
            let Some(node) = self.nodes.get(id) else {
                debug!("export path references a missing node (id={})", id);
                break;
            };
            path.push(node);
            current = node.children.first().map(String::as_str);
        }
        path
    }
}
