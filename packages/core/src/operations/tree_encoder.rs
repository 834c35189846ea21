//! Tree Encoder - preorder bound maintenance
//!
//! `TreeWorkspace` holds the structural columns of every node in the trees a
//! mutation touches, applies the three primitive operations on that in-memory
//! copy, and finally reports the difference against what was loaded. The
//! caller commits that difference as one atomic change set.
//!
//! # Primitives
//!
//! - [`TreeWorkspace::insert_node`]: open a gap of width 2 at the target edge
//!   and place a new node in it
//! - [`TreeWorkspace::detach_subtree`]: lift `[left, right]` out of its tree
//!   and close the gap
//! - [`TreeWorkspace::reattach_subtree`]: open a gap at the target edge and
//!   renumber the lifted subtree into it, preserving relative structure
//!
//! # Gap arithmetic
//!
//! Opening a gap of width `w` at edge `at` shifts every bound `>= at` by `w`.
//! Closing the gap left by `[l, r]` shifts every bound `> r` by `-(r - l + 1)`.
//! The two are exact inverses, so inserting a leaf and deleting it again
//! restores the original bounds bit for bit.
//!
//! # Example
//!
//! ```rust
//! use taxonomy_core::models::{CategoryNode, MovePosition};
//! use taxonomy_core::operations::TreeWorkspace;
//!
//! let mut root = CategoryNode::new("Electronics".into(), "electronics".into());
//! root.tree_id = 1;
//!
//! let mut workspace = TreeWorkspace::new();
//! workspace.load_tree(1, std::slice::from_ref(&root)).unwrap();
//! let placed = workspace
//!     .insert_node("phones", Some(&root.id), &MovePosition::LastChild, None)
//!     .unwrap();
//!
//! assert_eq!((placed.left, placed.right, placed.level), (2, 3, 1));
//! assert_eq!(workspace.get(&root.id).unwrap().right, 4);
//! ```

use crate::models::{CategoryNode, MovePosition, NodeStructure, StructuralUpdate};
use crate::operations::EncodingError;
use std::collections::{BTreeSet, HashMap};

/// A subtree lifted out of its tree, stored relative to its own root.
#[derive(Debug, Clone)]
pub struct DetachedSubtree {
    root_id: String,
    /// Pre-detach structure of the subtree root
    origin: NodeStructure,
    /// `(id, parent_id, left - root.left, right - root.left, level - root.level)`
    rows: Vec<RelativeRow>,
}

#[derive(Debug, Clone)]
struct RelativeRow {
    id: String,
    parent_id: Option<String>,
    left: i64,
    right: i64,
    depth: i64,
}

impl DetachedSubtree {
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Structure of the subtree root before it was detached
    pub fn origin(&self) -> &NodeStructure {
        &self.origin
    }

    pub fn width(&self) -> i64 {
        self.origin.width()
    }

    /// Ids of every node in the subtree, in preorder
    pub fn ids(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The difference between the loaded snapshot and the current workspace state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceChanges {
    /// Rows that did not exist in the snapshot
    pub inserted: Vec<StructuralUpdate>,
    /// Rows whose structural columns changed
    pub updated: Vec<StructuralUpdate>,
    /// Rows present in the snapshot but gone from the workspace
    pub removed: Vec<String>,
}

impl WorkspaceChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// In-memory working copy of the bound encoding for one or more trees.
#[derive(Debug, Clone, Default)]
pub struct TreeWorkspace {
    original: HashMap<String, NodeStructure>,
    current: HashMap<String, NodeStructure>,
    trees: BTreeSet<i64>,
}

impl TreeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every row of one tree. Rows must all carry `tree_id`.
    pub fn load_tree(&mut self, tree_id: i64, nodes: &[CategoryNode]) -> Result<(), EncodingError> {
        for node in nodes {
            if node.tree_id != tree_id {
                return Err(EncodingError::NodeOutsideTree {
                    node_id: node.id.clone(),
                    expected: tree_id,
                    actual: node.tree_id,
                });
            }
            if self.original.contains_key(&node.id) {
                return Err(EncodingError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
            self.original.insert(node.id.clone(), node.structure());
            self.current.insert(node.id.clone(), node.structure());
        }
        self.trees.insert(tree_id);
        Ok(())
    }

    pub fn is_tree_loaded(&self, tree_id: i64) -> bool {
        self.trees.contains(&tree_id)
    }

    /// Current (possibly already shifted) structure of a node
    pub fn get(&self, id: &str) -> Option<&NodeStructure> {
        self.current.get(id)
    }

    /// Structure of a node as it was loaded, before any primitive ran
    pub fn original(&self, id: &str) -> Option<&NodeStructure> {
        self.original.get(id)
    }

    /// Ancestor test against the current state (invariant 2)
    pub fn is_ancestor(&self, ancestor_id: &str, descendant_id: &str) -> bool {
        match (self.current.get(ancestor_id), self.current.get(descendant_id)) {
            (Some(ancestor), Some(descendant)) => ancestor.contains(descendant),
            _ => false,
        }
    }

    fn require(&self, id: &str) -> Result<&NodeStructure, EncodingError> {
        self.current
            .get(id)
            .ok_or_else(|| EncodingError::NodeNotLoaded {
                node_id: id.to_string(),
            })
    }

    /// Shift every bound `>= at` in `tree_id` by `width`. Returns rows touched.
    fn open_gap(&mut self, tree_id: i64, at: i64, width: i64) -> usize {
        let mut touched = 0;
        for row in self.current.values_mut().filter(|r| r.tree_id == tree_id) {
            if row.left >= at {
                row.left += width;
                row.right += width;
                touched += 1;
            } else if row.right >= at {
                row.right += width;
                touched += 1;
            }
        }
        touched
    }

    /// Close the hole left by `[left, right]` in `tree_id`. Returns rows touched.
    fn close_gap(&mut self, tree_id: i64, left: i64, right: i64) -> usize {
        let width = right - left + 1;
        let mut touched = 0;
        for row in self.current.values_mut().filter(|r| r.tree_id == tree_id) {
            let mut moved = false;
            if row.left > right {
                row.left -= width;
                moved = true;
            }
            if row.right > right {
                row.right -= width;
                moved = true;
            }
            if moved {
                touched += 1;
            }
        }
        touched
    }

    /// Resolve `(edge, level, tree_id)` for a new child of `parent_id`.
    fn insertion_point(
        &self,
        parent_id: &str,
        position: &MovePosition,
    ) -> Result<(i64, i64, i64), EncodingError> {
        let parent = self.require(parent_id)?;
        let at = match position {
            MovePosition::LastChild => parent.right,
            MovePosition::FirstChild => parent.left + 1,
            MovePosition::Before(anchor_id) | MovePosition::After(anchor_id) => {
                let anchor = self
                    .current
                    .get(anchor_id)
                    .filter(|a| a.parent_id.as_deref() == Some(parent_id))
                    .ok_or_else(|| EncodingError::InvalidAnchor {
                        anchor_id: anchor_id.clone(),
                        parent_id: parent_id.to_string(),
                    })?;
                if matches!(position, MovePosition::Before(_)) {
                    anchor.left
                } else {
                    anchor.right + 1
                }
            }
        };
        Ok((at, parent.level + 1, parent.tree_id))
    }

    /// Place a new single node.
    ///
    /// With a parent, the node lands at `position` among the parent's children
    /// and every bound at or after the insertion edge shifts by 2. Without a
    /// parent, the node becomes the sole member of `new_tree_id` at `1..2`.
    pub fn insert_node(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        position: &MovePosition,
        new_tree_id: Option<i64>,
    ) -> Result<NodeStructure, EncodingError> {
        if self.current.contains_key(id) {
            return Err(EncodingError::DuplicateNode {
                node_id: id.to_string(),
            });
        }

        let structure = match parent_id {
            Some(parent_id) => {
                let (at, level, tree_id) = self.insertion_point(parent_id, position)?;
                let shifted = self.open_gap(tree_id, at, 2);
                tracing::debug!(
                    "Opened gap at {} in tree {} ({} row(s) shifted)",
                    at,
                    tree_id,
                    shifted
                );
                NodeStructure {
                    parent_id: Some(parent_id.to_string()),
                    tree_id,
                    level,
                    left: at,
                    right: at + 1,
                }
            }
            None => {
                let tree_id = self.fresh_tree(id, new_tree_id)?;
                NodeStructure {
                    parent_id: None,
                    tree_id,
                    level: 0,
                    left: 1,
                    right: 2,
                }
            }
        };

        self.current.insert(id.to_string(), structure.clone());
        Ok(structure)
    }

    fn fresh_tree(&mut self, id: &str, new_tree_id: Option<i64>) -> Result<i64, EncodingError> {
        let tree_id = new_tree_id.ok_or_else(|| EncodingError::MissingTreeId {
            node_id: id.to_string(),
        })?;
        if self.current.values().any(|row| row.tree_id == tree_id) {
            return Err(EncodingError::TreeNotEmpty { tree_id });
        }
        self.trees.insert(tree_id);
        Ok(tree_id)
    }

    /// Remove a node and all its descendants from the bound space.
    ///
    /// The returned subtree can be handed to [`reattach_subtree`](Self::reattach_subtree);
    /// dropping it instead deletes the rows when the changes are committed.
    pub fn detach_subtree(&mut self, id: &str) -> Result<DetachedSubtree, EncodingError> {
        let origin = self.require(id)?.clone();

        let mut members: Vec<(String, NodeStructure)> = self
            .current
            .iter()
            .filter(|(_, row)| {
                row.tree_id == origin.tree_id && row.left >= origin.left && row.right <= origin.right
            })
            .map(|(id, row)| (id.clone(), row.clone()))
            .collect();
        members.sort_by_key(|(_, row)| row.left);

        for (member_id, _) in &members {
            self.current.remove(member_id);
        }

        let shifted = self.close_gap(origin.tree_id, origin.left, origin.right);
        tracing::debug!(
            "Detached {} row(s) at [{}, {}] from tree {} ({} row(s) shifted)",
            members.len(),
            origin.left,
            origin.right,
            origin.tree_id,
            shifted
        );

        let rows = members
            .into_iter()
            .map(|(member_id, row)| RelativeRow {
                id: member_id,
                parent_id: row.parent_id,
                left: row.left - origin.left,
                right: row.right - origin.left,
                depth: row.level - origin.level,
            })
            .collect();

        Ok(DetachedSubtree {
            root_id: id.to_string(),
            origin,
            rows,
        })
    }

    /// Renumber a detached subtree into its new position.
    ///
    /// Relative structure is preserved; absolute bounds, `tree_id` and `level`
    /// (`new_parent_level + 1 + relative_depth`) are recomputed. Without a new
    /// parent the subtree becomes its own tree under `new_tree_id`.
    pub fn reattach_subtree(
        &mut self,
        subtree: DetachedSubtree,
        new_parent_id: Option<&str>,
        position: &MovePosition,
        new_tree_id: Option<i64>,
    ) -> Result<NodeStructure, EncodingError> {
        let width = subtree.width();

        let (at, base_level, tree_id) = match new_parent_id {
            Some(parent_id) => {
                let (at, level, tree_id) = self.insertion_point(parent_id, position)?;
                let shifted = self.open_gap(tree_id, at, width);
                tracing::debug!(
                    "Opened gap of {} at {} in tree {} ({} row(s) shifted)",
                    width,
                    at,
                    tree_id,
                    shifted
                );
                (at, level, tree_id)
            }
            None => (1, 0, self.fresh_tree(&subtree.root_id, new_tree_id)?),
        };

        let mut placed_root = None;
        for row in subtree.rows {
            let is_root = row.id == subtree.root_id;
            let structure = NodeStructure {
                parent_id: if is_root {
                    new_parent_id.map(str::to_string)
                } else {
                    row.parent_id
                },
                tree_id,
                level: base_level + row.depth,
                left: at + row.left,
                right: at + row.right,
            };
            if is_root {
                placed_root = Some(structure.clone());
            }
            self.current.insert(row.id, structure);
        }

        placed_root.ok_or(EncodingError::NodeNotLoaded {
            node_id: subtree.root_id,
        })
    }

    /// Diff the workspace against the loaded snapshot.
    ///
    /// Updates are ordered by `(tree_id, left)` so callers and logs see a
    /// stable preorder.
    pub fn changes(&self) -> WorkspaceChanges {
        let mut inserted = Vec::new();
        let mut updated = Vec::new();

        for (id, structure) in &self.current {
            match self.original.get(id) {
                None => inserted.push(StructuralUpdate {
                    id: id.clone(),
                    structure: structure.clone(),
                }),
                Some(before) if before != structure => updated.push(StructuralUpdate {
                    id: id.clone(),
                    structure: structure.clone(),
                }),
                Some(_) => {}
            }
        }

        let mut removed: Vec<String> = self
            .original
            .keys()
            .filter(|id| !self.current.contains_key(*id))
            .cloned()
            .collect();

        inserted.sort_by_key(|u| (u.structure.tree_id, u.structure.left));
        updated.sort_by_key(|u| (u.structure.tree_id, u.structure.left));
        removed.sort();

        WorkspaceChanges {
            inserted,
            updated,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent: Option<&str>, level: i64, left: i64, right: i64) -> CategoryNode {
        tree_node(id, parent, 1, level, left, right)
    }

    fn tree_node(
        id: &str,
        parent: Option<&str>,
        tree_id: i64,
        level: i64,
        left: i64,
        right: i64,
    ) -> CategoryNode {
        let mut node = CategoryNode::new(id.to_string(), id.to_string());
        node.id = id.to_string();
        node.parent_id = parent.map(str::to_string);
        node.tree_id = tree_id;
        node.level = level;
        node.left = left;
        node.right = right;
        node
    }

    /// root(1,10) -> a(2,7) -> [a1(3,4), a2(5,6)], b(8,9)
    fn sample_tree() -> Vec<CategoryNode> {
        vec![
            node("root", None, 0, 1, 10),
            node("a", Some("root"), 1, 2, 7),
            node("a1", Some("a"), 2, 3, 4),
            node("a2", Some("a"), 2, 5, 6),
            node("b", Some("root"), 1, 8, 9),
        ]
    }

    fn loaded(nodes: &[CategoryNode]) -> TreeWorkspace {
        let mut workspace = TreeWorkspace::new();
        workspace.load_tree(1, nodes).unwrap();
        workspace
    }

    fn bounds(workspace: &TreeWorkspace, id: &str) -> (i64, i64, i64) {
        let row = workspace.get(id).unwrap();
        (row.left, row.right, row.level)
    }

    #[test]
    fn test_insert_root_occupies_one_two() {
        let mut workspace = TreeWorkspace::new();
        let placed = workspace
            .insert_node("solo", None, &MovePosition::LastChild, Some(7))
            .unwrap();
        assert_eq!(placed.tree_id, 7);
        assert_eq!((placed.left, placed.right, placed.level), (1, 2, 0));
        assert!(workspace.is_tree_loaded(7));
    }

    #[test]
    fn test_insert_root_requires_tree_id() {
        let mut workspace = TreeWorkspace::new();
        let err = workspace
            .insert_node("solo", None, &MovePosition::LastChild, None)
            .unwrap_err();
        assert!(matches!(err, EncodingError::MissingTreeId { .. }));
    }

    #[test]
    fn test_insert_last_child_shifts_right_side() {
        let mut workspace = loaded(&sample_tree());
        let placed = workspace
            .insert_node("a3", Some("a"), &MovePosition::LastChild, None)
            .unwrap();

        assert_eq!((placed.left, placed.right, placed.level), (7, 8, 2));
        assert_eq!(bounds(&workspace, "a"), (2, 9, 1));
        assert_eq!(bounds(&workspace, "root"), (1, 12, 0));
        assert_eq!(bounds(&workspace, "b"), (10, 11, 1));
        assert_eq!(bounds(&workspace, "a1"), (3, 4, 2));

        let changes = workspace.changes();
        assert_eq!(changes.inserted.len(), 1);
        assert_eq!(changes.updated.len(), 3);
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_insert_first_child_and_anchored() {
        let mut workspace = loaded(&sample_tree());
        let first = workspace
            .insert_node("a0", Some("a"), &MovePosition::FirstChild, None)
            .unwrap();
        assert_eq!((first.left, first.right), (3, 4));
        assert_eq!(bounds(&workspace, "a1"), (5, 6, 2));

        let mid = workspace
            .insert_node("mid", Some("a"), &MovePosition::After("a1".into()), None)
            .unwrap();
        assert_eq!((mid.left, mid.right), (7, 8));
        assert_eq!(bounds(&workspace, "a2"), (9, 10, 2));
    }

    #[test]
    fn test_anchor_must_be_child_of_parent() {
        let mut workspace = loaded(&sample_tree());
        let err = workspace
            .insert_node("x", Some("a"), &MovePosition::Before("b".into()), None)
            .unwrap_err();
        assert!(matches!(err, EncodingError::InvalidAnchor { .. }));
    }

    #[test]
    fn test_insert_then_delete_round_trips() {
        let nodes = sample_tree();
        let mut workspace = loaded(&nodes);
        workspace
            .insert_node("tmp", Some("a1"), &MovePosition::LastChild, None)
            .unwrap();
        let detached = workspace.detach_subtree("tmp").unwrap();
        assert_eq!(detached.len(), 1);

        assert!(workspace.changes().is_empty());
        for node in &nodes {
            assert_eq!(workspace.get(&node.id), Some(&node.structure()));
        }
    }

    #[test]
    fn test_detach_closes_gap() {
        let mut workspace = loaded(&sample_tree());
        let detached = workspace.detach_subtree("a").unwrap();

        assert_eq!(detached.width(), 6);
        assert_eq!(detached.ids(), vec!["a", "a1", "a2"]);
        assert_eq!(bounds(&workspace, "root"), (1, 4, 0));
        assert_eq!(bounds(&workspace, "b"), (2, 3, 1));

        let changes = workspace.changes();
        assert_eq!(changes.removed, vec!["a", "a1", "a2"]);
        assert_eq!(changes.updated.len(), 2);
    }

    #[test]
    fn test_reattach_under_sibling_recomputes_levels() {
        let mut workspace = loaded(&sample_tree());
        let detached = workspace.detach_subtree("a").unwrap();
        let placed = workspace
            .reattach_subtree(detached, Some("b"), &MovePosition::LastChild, None)
            .unwrap();

        assert_eq!(placed.parent_id.as_deref(), Some("b"));
        // root(1,10) -> b(2,9) -> a(3,8) -> [a1(4,5), a2(6,7)]
        assert_eq!((placed.left, placed.right, placed.level), (3, 8, 2));
        assert_eq!(bounds(&workspace, "b"), (2, 9, 1));
        assert_eq!(bounds(&workspace, "a1"), (4, 5, 3));
        assert_eq!(bounds(&workspace, "a2"), (6, 7, 3));
        assert_eq!(bounds(&workspace, "root"), (1, 10, 0));
        assert_eq!(
            workspace.get("a1").unwrap().parent_id.as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_reattach_same_position_is_noop() {
        let mut workspace = loaded(&sample_tree());
        let detached = workspace.detach_subtree("b").unwrap();
        workspace
            .reattach_subtree(detached, Some("root"), &MovePosition::LastChild, None)
            .unwrap();
        assert!(workspace.changes().is_empty());
    }

    #[test]
    fn test_reattach_as_new_root() {
        let mut workspace = loaded(&sample_tree());
        let detached = workspace.detach_subtree("a").unwrap();
        let placed = workspace
            .reattach_subtree(detached, None, &MovePosition::LastChild, Some(9))
            .unwrap();

        assert_eq!(placed.tree_id, 9);
        assert!(placed.parent_id.is_none());
        assert_eq!((placed.left, placed.right, placed.level), (1, 6, 0));
        assert_eq!(bounds(&workspace, "a2"), (4, 5, 1));
        assert_eq!(workspace.get("a2").unwrap().tree_id, 9);
    }

    #[test]
    fn test_reattach_across_trees() {
        let mut workspace = loaded(&sample_tree());
        workspace
            .load_tree(2, &[tree_node("other", None, 2, 0, 1, 2)])
            .unwrap();

        let detached = workspace.detach_subtree("a").unwrap();
        let placed = workspace
            .reattach_subtree(detached, Some("other"), &MovePosition::LastChild, None)
            .unwrap();

        assert_eq!(placed.tree_id, 2);
        assert_eq!((placed.left, placed.right, placed.level), (2, 7, 1));
        assert_eq!(bounds(&workspace, "other"), (1, 8, 0));
        assert_eq!(bounds(&workspace, "root"), (1, 4, 0));
        assert!(workspace.is_ancestor("other", "a1"));
        assert!(!workspace.is_ancestor("root", "a1"));
    }

    #[test]
    fn test_load_rejects_foreign_rows() {
        let mut workspace = TreeWorkspace::new();
        let err = workspace
            .load_tree(3, &[tree_node("x", None, 4, 0, 1, 2)])
            .unwrap_err();
        assert!(matches!(err, EncodingError::NodeOutsideTree { .. }));
    }

    #[test]
    fn test_original_survives_mutation() {
        let mut workspace = loaded(&sample_tree());
        workspace.detach_subtree("a").unwrap();
        assert_eq!(workspace.original("a").unwrap().left, 2);
        assert!(workspace.get("a").is_none());
    }
}
