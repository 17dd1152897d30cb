use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Identifier of a node, unique within its tree.
pub type NodeId = u32;

/// A stored block referenced by a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockInfo {
    pub name: String,
    /// Size in bytes. Index logs do not record sizes, so reloaded entries carry 0.
    pub size: u64,
}

impl BlockInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// One path segment in a [`PathTree`](super::PathTree).
///
/// Nodes live in the tree's arena; parent and child links are ids, never
/// references, so a tree can be rebuilt from a log in any order.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub(crate) id: NodeId,
    pub(crate) segment: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: SmallVec<[NodeId; 4]>,
    pub(crate) blocks: Vec<BlockInfo>,
}

impl PathNode {
    pub(crate) fn new(id: NodeId, segment: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            id,
            segment: segment.into(),
            parent,
            children: SmallVec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    /// A leaf terminates a stored path and carries its blocks.
    ///
    /// A leaf may still gain children when a longer path is inserted through it;
    /// it keeps its blocks and stays a leaf.
    pub fn is_leaf(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
