//! Line-oriented index log.
//!
//! Each tree is written as one record:
//!
//! ```text
//! fs-one
//! <<
//! 0,fs-one
//! 1,9q
//! 2,100,b1&&&b3
//! 3,101,b2
//! >>
//! [[
//! 1$2,3
//! 0$1
//! ]]
//! $$
//! ```
//!
//! Node lines are `id,segment[,block&&&block...]` in depth-first preorder.
//! Relation lines are `parent$child,child,...` in postorder, so a parent's
//! line follows those of its descendants. Block sizes are not recorded.
//! Several records may be concatenated in one file.

use super::node::{BlockInfo, NodeId, PathNode};
use super::tree::PathTree;
use crate::error::{GeoshardError, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const NODES_OPEN: &str = "<<";
pub const NODES_CLOSE: &str = ">>";
pub const RELATIONS_OPEN: &str = "[[";
pub const RELATIONS_CLOSE: &str = "]]";
pub const RECORD_END: &str = "$$";
pub const BLOCK_SEPARATOR: &str = "&&&";
const RELATION_SEPARATOR: char = '$';

fn is_sentinel(line: &str) -> bool {
    matches!(
        line,
        NODES_OPEN | NODES_CLOSE | RELATIONS_OPEN | RELATIONS_CLOSE | RECORD_END
    )
}

impl PathTree {
    /// Render this tree as one index log record.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_record(&mut out);
        out
    }

    fn write_record(&self, out: &mut String) {
        let mut properties = String::new();
        let mut relations = String::new();
        self.write_subtree(self.root(), &mut properties, &mut relations);

        out.push_str(self.name());
        out.push('\n');
        out.push_str(NODES_OPEN);
        out.push('\n');
        out.push_str(&properties);
        out.push_str(NODES_CLOSE);
        out.push('\n');
        out.push_str(RELATIONS_OPEN);
        out.push('\n');
        out.push_str(&relations);
        out.push_str(RELATIONS_CLOSE);
        out.push('\n');
        out.push_str(RECORD_END);
        out.push('\n');
    }

    fn write_subtree(&self, id: NodeId, properties: &mut String, relations: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };

        properties.push_str(&format!("{},{}", node.id(), node.segment()));
        if node.is_leaf() {
            let names: Vec<&str> = node.blocks().iter().map(|b| b.name.as_str()).collect();
            properties.push(',');
            properties.push_str(&names.join(BLOCK_SEPARATOR));
        }
        properties.push('\n');

        for child in node.children() {
            self.write_subtree(*child, properties, relations);
        }

        if !node.children().is_empty() {
            let children: Vec<String> = node.children().iter().map(|c| c.to_string()).collect();
            relations.push_str(&format!(
                "{}{}{}\n",
                node.id(),
                RELATION_SEPARATOR,
                children.join(",")
            ));
        }
    }

    /// Append this tree's record to the log at `path`, creating it if needed.
    pub fn append_to_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(self.serialize().as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Concatenate the records of several trees.
pub fn serialize_all<'a, I>(trees: I) -> String
where
    I: IntoIterator<Item = &'a PathTree>,
{
    let mut out = String::new();
    for tree in trees {
        tree.write_record(&mut out);
    }
    out
}

/// Parse every record in `text`, returning one result per record.
///
/// Blank lines are ignored and surrounding whitespace is trimmed. Text after
/// the last `$$` that is not itself terminated is reported as a malformed
/// record.
pub fn deserialize_records(text: &str) -> Vec<Result<PathTree>> {
    let mut results = Vec::new();
    let mut record: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == RECORD_END {
            if !record.is_empty() {
                results.push(parse_record(&record));
                record.clear();
            }
        } else {
            record.push(line);
        }
    }

    if let Some(first) = record.first() {
        results.push(Err(GeoshardError::malformed(
            first,
            "record is not terminated by $$",
        )));
    }

    results
}

/// Parse every record in `text`, keeping the trees that reconstruct cleanly.
///
/// Malformed records are logged and skipped. When two records share a name
/// the later one wins.
pub fn deserialize(text: &str) -> BTreeMap<String, PathTree> {
    let mut trees = BTreeMap::new();
    for result in deserialize_records(text) {
        match result {
            Ok(tree) => {
                if let Some(previous) = trees.insert(tree.name().to_string(), tree) {
                    log::warn!(
                        "Index log contains tree '{}' more than once; keeping the later record",
                        previous.name()
                    );
                }
            }
            Err(e) => log::warn!("Skipping index record: {}", e),
        }
    }
    trees
}

/// Read and parse an index log file.
pub fn load_log<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, PathTree>> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(deserialize(&text))
}

/// Replace the log at `path` with records for `trees`.
///
/// The new content is written to a sibling file and renamed over the target,
/// so readers never observe a partially written log.
pub fn save_log<'a, P, I>(path: P, trees: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a PathTree>,
{
    let path = path.as_ref();
    let staging = path.with_extension("rewrite");
    {
        let file = fs::File::create(&staging)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(serialize_all(trees).as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

/// Position of the first `sentinel` at or after `from`.
fn position_of(lines: &[&str], from: usize, sentinel: &str) -> Option<usize> {
    lines
        .get(from..)?
        .iter()
        .position(|l| *l == sentinel)
        .map(|p| p + from)
}

fn parse_id(tree: &str, text: &str) -> Result<NodeId> {
    text.trim()
        .parse::<NodeId>()
        .map_err(|_| GeoshardError::malformed(tree, format!("invalid node id '{text}'")))
}

fn parse_record(lines: &[&str]) -> Result<PathTree> {
    let name = match lines.first() {
        Some(line) if !is_sentinel(line) => *line,
        _ => {
            return Err(GeoshardError::malformed(
                "<unnamed>",
                "record does not start with a tree name",
            ));
        }
    };

    if lines.get(1) != Some(&NODES_OPEN) {
        return Err(GeoshardError::malformed(name, "missing << after tree name"));
    }
    let nodes_close = position_of(lines, 2, NODES_CLOSE)
        .ok_or_else(|| GeoshardError::malformed(name, "node section is not closed by >>"))?;
    if lines.get(nodes_close + 1) != Some(&RELATIONS_OPEN) {
        return Err(GeoshardError::malformed(name, "missing [[ after node section"));
    }
    let relations_close = position_of(lines, nodes_close + 2, RELATIONS_CLOSE).ok_or_else(|| {
        GeoshardError::malformed(name, "relation section is not closed by ]]")
    })?;
    if relations_close + 1 != lines.len() {
        return Err(GeoshardError::malformed(
            name,
            "unexpected content after relation section",
        ));
    }

    let node_lines = &lines[2..nodes_close];
    let relation_lines = &lines[nodes_close + 2..relations_close];
    if let Some(stray) = node_lines
        .iter()
        .chain(relation_lines.iter())
        .find(|l| is_sentinel(l))
    {
        return Err(GeoshardError::malformed(
            name,
            format!("sentinel {stray} out of order"),
        ));
    }

    let (root, mut nodes) = parse_nodes(name, node_lines)?;
    link_relations(name, root, &mut nodes, relation_lines)?;
    check_reachable(name, root, &nodes)?;

    PathTree::assemble(name.to_string(), root, nodes)
}

fn parse_nodes(tree: &str, lines: &[&str]) -> Result<(NodeId, FxHashMap<NodeId, PathNode>)> {
    let mut nodes = FxHashMap::default();
    let mut root = None;

    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(GeoshardError::malformed(
                tree,
                format!("node line '{line}' must have two or three fields"),
            ));
        }

        let id = parse_id(tree, fields[0])?;
        let segment = fields[1];
        if segment.is_empty() {
            return Err(GeoshardError::malformed(
                tree,
                format!("node {id} has an empty segment"),
            ));
        }

        let mut node = PathNode::new(id, segment, None);
        if let Some(blocks) = fields.get(2) {
            for block in blocks.split(BLOCK_SEPARATOR).map(str::trim) {
                if block.is_empty() {
                    return Err(GeoshardError::malformed(
                        tree,
                        format!("node {id} has an empty block name"),
                    ));
                }
                node.blocks.push(BlockInfo::new(block, 0));
            }
        }

        if nodes.insert(id, node).is_some() {
            return Err(GeoshardError::malformed(tree, format!("duplicate node id {id}")));
        }
        root.get_or_insert(id);
    }

    let root = root.ok_or_else(|| GeoshardError::malformed(tree, "node section is empty"))?;
    Ok((root, nodes))
}

fn link_relations(
    tree: &str,
    root: NodeId,
    nodes: &mut FxHashMap<NodeId, PathNode>,
    lines: &[&str],
) -> Result<()> {
    for line in lines {
        let (parent, children) = line.split_once(RELATION_SEPARATOR).ok_or_else(|| {
            GeoshardError::malformed(tree, format!("relation line '{line}' has no $"))
        })?;
        let parent = parse_id(tree, parent)?;
        if !nodes.contains_key(&parent) {
            return Err(GeoshardError::malformed(
                tree,
                format!("relation references unknown node {parent}"),
            ));
        }

        for child in children.split(',') {
            let child = parse_id(tree, child)?;
            if child == root {
                return Err(GeoshardError::malformed(tree, "root node cannot be a child"));
            }
            let node = nodes.get_mut(&child).ok_or_else(|| {
                GeoshardError::malformed(tree, format!("relation references unknown node {child}"))
            })?;
            if node.parent.is_some() {
                return Err(GeoshardError::malformed(
                    tree,
                    format!("node {child} has more than one parent"),
                ));
            }
            node.parent = Some(parent);
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.push(child);
            }
        }
    }
    Ok(())
}

fn check_reachable(tree: &str, root: NodeId, nodes: &FxHashMap<NodeId, PathNode>) -> Result<()> {
    let mut seen = 0usize;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        seen += 1;
        if seen > nodes.len() {
            break;
        }
        if let Some(node) = nodes.get(&id) {
            stack.extend(node.children.iter().copied());
        }
    }
    if seen != nodes.len() {
        return Err(GeoshardError::malformed(
            tree,
            "some nodes are not attached to the root",
        ));
    }
    Ok(())
}
