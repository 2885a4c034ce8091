//! File tree assembly from flat, sorted path listings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    /// Classify `stat -c %F` output.
    pub fn from_stat(output: &str) -> Self {
        if output.trim() == "directory" {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<Vec<FileNode>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
}

impl FileNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Depth-first search by absolute path.
    pub fn find(&self, path: &str) -> Option<&FileNode> {
        if self.path == path {
            return Some(self);
        }
        self.children
            .as_ref()?
            .iter()
            .find_map(|child| child.find(path))
    }
}

/// One classified path from a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub kind: NodeKind,
    pub content: Option<String>,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: None,
        }
    }
}

/// Strip trailing slashes, keeping `/` as the empty root.
pub fn normalize_root(root: &str) -> &str {
    root.trim_end_matches('/')
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Assemble the forest under `root` from classified paths.
///
/// Entries are processed in byte-wise lexicographic order, so every parent
/// is attached before its children. The root itself is never returned.
/// Entries whose parent is missing are dropped.
pub fn build_forest(root: &str, mut entries: Vec<TreeEntry>) -> Vec<FileNode> {
    let root = normalize_root(root);
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries.dedup_by(|a, b| a.path == b.path);

    let mut slots: Vec<(FileNode, Vec<usize>)> = Vec::with_capacity(entries.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut top = Vec::new();

    for entry in entries {
        let parent = parent_of(&entry.path);
        let id = slots.len();

        if parent == root {
            top.push(id);
        } else if let Some(&parent_id) = index.get(parent) {
            if slots[parent_id].0.kind != NodeKind::Directory {
                warn!(path = %entry.path, "parent is not a directory, skipping");
                continue;
            }
            slots[parent_id].1.push(id);
        } else {
            warn!(path = %entry.path, "parent missing from listing, skipping");
            continue;
        }

        let node = FileNode {
            name: name_of(&entry.path).to_string(),
            path: entry.path.clone(),
            kind: entry.kind,
            children: None,
            content: if entry.kind == NodeKind::File {
                entry.content
            } else {
                None
            },
        };
        index.insert(entry.path, id);
        slots.push((node, Vec::new()));
    }

    // Children always have larger ids than their parent, so building from
    // the back finishes every subtree before it is attached.
    let mut built: Vec<Option<FileNode>> = vec![None; slots.len()];
    for (id, (mut node, children)) in slots.into_iter().enumerate().rev() {
        if node.kind == NodeKind::Directory {
            node.children = Some(
                children
                    .iter()
                    .filter_map(|child| built[*child].take())
                    .collect(),
            );
        }
        built[id] = Some(node);
    }

    top.iter().filter_map(|id| built[*id].take()).collect()
}
