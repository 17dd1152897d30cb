use super::node::{BlockInfo, NodeId, PathNode};
use crate::error::{GeoshardError, Result};
use rustc_hash::FxHashMap;

/// Separator between segments in a full path string.
pub const PATH_SEPARATOR: char = '/';

/// Id of the root node of every tree built by [`PathTree::new`].
pub const ROOT_ID: NodeId = 0;

/// Prefix tree mapping path segments to stored blocks.
///
/// One tree exists per filesystem. Nodes are kept in an id-addressed arena and
/// numbered monotonically from a per-tree counter; ids never change once
/// assigned. An auxiliary map from the `/`-joined full path to the block list
/// serves exact lookups without walking the tree.
///
/// # Thread Safety
///
/// Mutation is not synchronized. A tree must have a single writer at a time;
/// wrap it in a lock when several callers insert into the same tree.
///
/// # Examples
///
/// ```rust
/// use geoshard::index::PathTree;
///
/// let mut tree = PathTree::new("roads-2019")?;
/// tree.insert_path(&["9q8y", "17901"], "block-1", 4096)?;
/// tree.insert_path(&["9q8y", "17901"], "block-2", 1024)?;
///
/// let blocks = tree.lookup_exact("9q8y/17901").unwrap();
/// assert_eq!(blocks.len(), 2);
/// assert_eq!(tree.node_count(), 3);
/// # Ok::<(), geoshard::GeoshardError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PathTree {
    name: String,
    root: NodeId,
    nodes: FxHashMap<NodeId, PathNode>,
    path_blocks: FxHashMap<String, Vec<BlockInfo>>,
    next_id: NodeId,
}

/// Characters that would corrupt the line-oriented index log.
fn check_text(kind: &str, value: &str, forbidden: &[&str]) -> Result<()> {
    if value.is_empty() {
        return Err(GeoshardError::InvalidInput(format!("{kind} cannot be empty")));
    }
    if value.trim() != value {
        return Err(GeoshardError::InvalidInput(format!(
            "{kind} '{value}' has leading or trailing whitespace"
        )));
    }
    if let Some(bad) = forbidden.iter().find(|f| value.contains(**f)) {
        return Err(GeoshardError::InvalidInput(format!(
            "{kind} '{value}' cannot contain {bad:?}"
        )));
    }
    Ok(())
}

fn check_segment(segment: &str) -> Result<()> {
    check_text("path segment", segment, &[",", "/", "\n", "\r"])
}

fn check_block_name(name: &str) -> Result<()> {
    check_text("block name", name, &[",", "&&&", "\n", "\r"])?;
    // a leading or trailing '&' would merge into the adjacent separator
    if name.starts_with('&') || name.ends_with('&') {
        return Err(GeoshardError::InvalidInput(format!(
            "block name '{name}' cannot start or end with '&'"
        )));
    }
    Ok(())
}

fn check_tree_name(name: &str) -> Result<()> {
    check_text("tree name", name, &[",", "/", "$", "\n", "\r"])?;
    if matches!(name, "<<" | ">>" | "[[" | "]]") {
        return Err(GeoshardError::InvalidInput(format!(
            "tree name '{name}' collides with a log sentinel"
        )));
    }
    Ok(())
}

impl PathTree {
    /// Create an empty tree whose root segment is the tree name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_tree_name(&name)?;
        let mut nodes = FxHashMap::default();
        nodes.insert(ROOT_ID, PathNode::new(ROOT_ID, name.clone(), None));
        Ok(Self {
            name,
            root: ROOT_ID,
            nodes,
            path_blocks: FxHashMap::default(),
            next_id: ROOT_ID + 1,
        })
    }

    /// Assemble a tree from already-linked nodes, rebuilding the path map and
    /// resuming the id counter after the highest id present.
    pub(crate) fn assemble(
        name: String,
        root: NodeId,
        nodes: FxHashMap<NodeId, PathNode>,
    ) -> Result<Self> {
        let next_id = match nodes.keys().copied().max() {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                GeoshardError::malformed(&name, format!("node id {max} leaves no room for new nodes"))
            })?,
            None => ROOT_ID,
        };
        let mut tree = Self {
            name,
            root,
            nodes,
            path_blocks: FxHashMap::default(),
            next_id,
        };
        let leaves: Vec<(String, Vec<BlockInfo>)> = tree
            .leaves_under_node(root)
            .into_iter()
            .map(|(path, blocks)| (path, blocks.to_vec()))
            .collect();
        tree.path_blocks.extend(leaves);
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&PathNode> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct stored paths.
    pub fn path_count(&self) -> usize {
        self.path_blocks.len()
    }

    pub fn block_count(&self) -> usize {
        self.path_blocks.values().map(Vec::len).sum()
    }

    /// Id the next created node will receive.
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(PathNode::children).unwrap_or_default()
    }

    fn child_by_segment(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.segment == segment))
    }

    fn push_child(&mut self, parent: NodeId, segment: &str) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes
            .insert(id, PathNode::new(id, segment, Some(parent)));
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        id
    }

    /// Insert a block under the path given by `segments`.
    ///
    /// Existing nodes are followed as long as a child matches the next
    /// segment exactly; the remaining segments become a fresh chain of nodes.
    /// Inserting the same path again appends to the existing leaf instead of
    /// creating a second one. Returns the id of the leaf.
    ///
    /// # Errors
    ///
    /// Returns [`GeoshardError::InvalidInput`] for an empty segment list and for
    /// segments or block names the index log cannot represent.
    pub fn insert_path<S: AsRef<str>>(
        &mut self,
        segments: &[S],
        block_id: &str,
        block_size: u64,
    ) -> Result<NodeId> {
        if segments.is_empty() {
            return Err(GeoshardError::InvalidInput(
                "cannot insert an empty segment path".into(),
            ));
        }
        for segment in segments {
            check_segment(segment.as_ref())?;
        }
        check_block_name(block_id)?;

        let mut current = self.root;
        let mut matched = 0;
        for segment in segments {
            match self.child_by_segment(current, segment.as_ref()) {
                Some(child) => {
                    current = child;
                    matched += 1;
                }
                None => break,
            }
        }
        let fresh = &segments[matched..];
        let room = NodeId::try_from(fresh.len())
            .ok()
            .and_then(|n| self.next_id.checked_add(n));
        if room.is_none() {
            return Err(GeoshardError::InvalidInput(format!(
                "tree '{}' has run out of node ids",
                self.name
            )));
        }
        for segment in fresh {
            current = self.push_child(current, segment.as_ref());
        }

        let block = BlockInfo::new(block_id, block_size);
        if let Some(leaf) = self.nodes.get_mut(&current) {
            leaf.blocks.push(block.clone());
        }
        self.path_blocks
            .entry(join_path(segments))
            .or_default()
            .push(block);

        Ok(current)
    }

    /// [`insert_path`](Self::insert_path) with a `/`-separated path string.
    pub fn insert_str(&mut self, path: &str, block_id: &str, block_size: u64) -> Result<NodeId> {
        let segments: Vec<&str> = path
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        self.insert_path(&segments, block_id, block_size)
    }

    /// Blocks stored under an exact `/`-joined path, without walking the tree.
    pub fn lookup_exact(&self, path: &str) -> Option<&[BlockInfo]> {
        self.path_blocks.get(path).map(Vec::as_slice)
    }

    /// Walk from the root along `segments`. An empty slice yields the root.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        let mut current = self.root;
        for segment in segments {
            current = self.child_by_segment(current, segment.as_ref())?;
        }
        Some(current)
    }

    pub fn blocks(&self, id: NodeId) -> &[BlockInfo] {
        self.nodes.get(&id).map(PathNode::blocks).unwrap_or_default()
    }

    /// The `/`-joined path from below the root down to `id`.
    pub fn full_path(&self, id: NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(&id)?;
        while let Some(parent) = current.parent {
            segments.push(current.segment.as_str());
            current = self.nodes.get(&parent)?;
        }
        segments.reverse();
        Some(join_path(&segments))
    }

    /// Every leaf at or below the node reached by `prefix`, with its full path.
    pub fn leaves_under<S: AsRef<str>>(&self, prefix: &[S]) -> Vec<(String, &[BlockInfo])> {
        match self.find(prefix) {
            Some(id) => self.leaves_under_node(id),
            None => Vec::new(),
        }
    }

    fn leaves_under_node(&self, id: NodeId) -> Vec<(String, &[BlockInfo])> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if node.is_leaf()
                && let Some(path) = self.full_path(current)
            {
                out.push((path, node.blocks()));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.path_blocks.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(PATH_SEPARATOR);
        }
        out.push_str(segment.as_ref());
    }
    out
}
