use super::transport::{NodeAddr, NodeDirectory};

/// Static directory assigning geohash prefixes to nodes.
///
/// A node owns a cell when its prefix and the cell key share their common
/// length, so a coarse query cell resolves to every node owning a finer
/// partition inside it and a fine cell resolves to the node owning the
/// enclosing partition.
///
/// ```rust
/// use geoshard::scatter::{NodeAddr, NodeDirectory, PrefixDirectory};
///
/// let directory = PrefixDirectory::new()
///     .with_assignment("9q", "node-a")
///     .with_assignment("dr", "node-b");
///
/// assert_eq!(directory.owners("9q8y"), [NodeAddr::from("node-a")]);
/// assert!(directory.owners("u4").is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PrefixDirectory {
    assignments: Vec<(String, NodeAddr)>,
}

impl PrefixDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assignment(mut self, prefix: &str, node: impl Into<NodeAddr>) -> Self {
        self.assign(prefix, node);
        self
    }

    /// Add an owner for `prefix`. The prefix is lowercased like geohash keys.
    pub fn assign(&mut self, prefix: &str, node: impl Into<NodeAddr>) {
        let prefix = prefix.trim().to_ascii_lowercase();
        let node = node.into();
        if !self
            .assignments
            .iter()
            .any(|(p, n)| *p == prefix && *n == node)
        {
            self.assignments.push((prefix, node));
        }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl NodeDirectory for PrefixDirectory {
    fn owners(&self, key: &str) -> Vec<NodeAddr> {
        let mut owners: Vec<NodeAddr> = self
            .assignments
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()) || prefix.starts_with(key))
            .map(|(_, node)| node.clone())
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scatter::targets_for_polygon;
    use geoshard_types::{BoundingBox, GeoPolygon};

    #[test]
    fn test_owners_match_both_directions() {
        let directory = PrefixDirectory::new()
            .with_assignment("9q8", "a")
            .with_assignment("9q9", "b")
            .with_assignment("9", "c");

        assert_eq!(directory.owners("9q8y"), [NodeAddr::from("a"), "c".into()]);
        assert_eq!(
            directory.owners("9q"),
            [NodeAddr::from("a"), "b".into(), "c".into()]
        );
        assert!(directory.owners("dr").is_empty());
    }

    #[test]
    fn test_duplicate_assignment_ignored() {
        let directory = PrefixDirectory::new()
            .with_assignment("9Q", "a")
            .with_assignment("9q", "a");
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_targets_for_polygon() {
        // lat 12..25 / lon -30..-5 covers nine precision-2 cells under "e"
        let polygon = GeoPolygon::from_bbox(&BoundingBox::new(12.0, 25.0, -30.0, -5.0));
        let directory = PrefixDirectory::new()
            .with_assignment("e6", "a")
            .with_assignment("es", "b")
            .with_assignment("es", "c")
            .with_assignment("9q", "far");

        let targets = targets_for_polygon(&directory, &polygon, 2).unwrap();
        let names: Vec<&str> = targets.iter().map(NodeAddr::as_str).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
