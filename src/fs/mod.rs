//! Remote filesystem bridge
//!
//! Reconstructs directory trees from flat command output and reads or
//! writes files inside a container through the runtime client.

mod bridge;
mod tree;

pub use bridge::RemoteFileSystem;
pub use tree::{build_forest, FileNode, NodeKind, TreeEntry};
