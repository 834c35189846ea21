//! Encoding integrity checks and rebuilds
//!
//! `check_tree` verifies the invariants of one tree from its rows alone.
//! `plan_rebuild` recomputes the whole encoding from `parent_id` links, which
//! is the repair path when bounds have been corrupted outside the engine.

use crate::models::{CategoryNode, NodeStructure, StructuralUpdate};
use crate::operations::EncodingError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A single broken invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum IntegrityViolation {
    /// `left >= right`
    InvalidInterval { node_id: String, left: i64, right: i64 },
    /// Two intervals partially overlap
    PartialOverlap { node_id: String, other_id: String },
    /// Level does not match nesting depth
    LevelMismatch {
        node_id: String,
        expected: i64,
        actual: i64,
    },
    /// `parent_id` disagrees with the enclosing interval
    ParentMismatch {
        node_id: String,
        expected: Option<String>,
        actual: Option<String>,
    },
    /// Bounds are not exactly `1..=2n`
    BoundsNotContiguous { tree_id: i64 },
    /// More than one root shares a tree id
    MultipleRoots { tree_id: i64 },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval {
                node_id,
                left,
                right,
            } => write!(f, "node {} has invalid interval [{}, {}]", node_id, left, right),
            Self::PartialOverlap { node_id, other_id } => {
                write!(f, "node {} partially overlaps {}", node_id, other_id)
            }
            Self::LevelMismatch {
                node_id,
                expected,
                actual,
            } => write!(
                f,
                "node {} has level {}, expected {}",
                node_id, actual, expected
            ),
            Self::ParentMismatch {
                node_id,
                expected,
                actual,
            } => write!(
                f,
                "node {} has parent {:?}, bounds say {:?}",
                node_id, actual, expected
            ),
            Self::BoundsNotContiguous { tree_id } => {
                write!(f, "tree {} bounds are not contiguous", tree_id)
            }
            Self::MultipleRoots { tree_id } => write!(f, "tree {} has more than one root", tree_id),
        }
    }
}

/// Verify one tree's rows (any order) against the encoding invariants.
pub fn check_tree(tree_id: i64, nodes: &[CategoryNode]) -> Vec<IntegrityViolation> {
    let mut violations = Vec::new();
    let mut sorted: Vec<&CategoryNode> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.left);

    let mut edges: Vec<i64> = Vec::with_capacity(sorted.len() * 2);
    let mut stack: Vec<&CategoryNode> = Vec::new();
    let mut roots = 0usize;

    for node in sorted.iter().copied() {
        edges.push(node.left);
        edges.push(node.right);

        if node.left >= node.right {
            violations.push(IntegrityViolation::InvalidInterval {
                node_id: node.id.clone(),
                left: node.left,
                right: node.right,
            });
            continue;
        }

        while stack.last().is_some_and(|top| top.right < node.left) {
            stack.pop();
        }

        if let Some(top) = stack.last() {
            if node.right > top.right {
                violations.push(IntegrityViolation::PartialOverlap {
                    node_id: node.id.clone(),
                    other_id: top.id.clone(),
                });
                continue;
            }
        }

        let expected_level = stack.len() as i64;
        if node.level != expected_level {
            violations.push(IntegrityViolation::LevelMismatch {
                node_id: node.id.clone(),
                expected: expected_level,
                actual: node.level,
            });
        }

        let expected_parent = stack.last().map(|top| top.id.clone());
        if node.parent_id != expected_parent {
            violations.push(IntegrityViolation::ParentMismatch {
                node_id: node.id.clone(),
                expected: expected_parent,
                actual: node.parent_id.clone(),
            });
        }

        if stack.is_empty() {
            roots += 1;
        }
        stack.push(node);
    }

    if roots > 1 {
        violations.push(IntegrityViolation::MultipleRoots { tree_id });
    }

    edges.sort_unstable();
    let contiguous = edges
        .iter()
        .enumerate()
        .all(|(index, edge)| *edge == index as i64 + 1);
    if !contiguous {
        violations.push(IntegrityViolation::BoundsNotContiguous { tree_id });
    }

    violations
}

/// One rebuilt tree. `tree_id` is `None` when the root needs a fresh id
/// because an earlier root already claimed its old one.
#[derive(Debug, Clone)]
pub struct RebuiltTree {
    pub root_id: String,
    pub tree_id: Option<i64>,
    /// Preorder rows; `structure.tree_id` is a placeholder when `tree_id` is `None`
    pub rows: Vec<StructuralUpdate>,
}

impl RebuiltTree {
    /// Stamp the final tree id on every row
    pub fn assign_tree_id(&mut self, tree_id: i64) {
        self.tree_id = Some(tree_id);
        for row in &mut self.rows {
            row.structure.tree_id = tree_id;
        }
    }
}

/// Recompute the encoding of the whole forest from `parent_id` links.
///
/// Roots are nodes without a parent or whose parent no longer exists.
/// Children keep their current relative order (by `left`, then title).
pub fn plan_rebuild(nodes: &[CategoryNode]) -> Result<Vec<RebuiltTree>, EncodingError> {
    let by_id: HashMap<&str, &CategoryNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut children: HashMap<&str, Vec<&CategoryNode>> = HashMap::new();
    let mut roots: Vec<&CategoryNode> = Vec::new();
    for node in nodes {
        match node.parent_id.as_deref().filter(|p| by_id.contains_key(p)) {
            Some(parent_id) => children.entry(parent_id).or_default().push(node),
            None => roots.push(node),
        }
    }
    let order = |a: &&CategoryNode, b: &&CategoryNode| {
        (a.tree_id, a.left, &a.title).cmp(&(b.tree_id, b.left, &b.title))
    };
    roots.sort_by(order);
    for list in children.values_mut() {
        list.sort_by(order);
    }

    let mut claimed: HashSet<i64> = HashSet::new();
    let mut trees = Vec::with_capacity(roots.len());
    let mut visited = 0usize;

    for root in roots {
        let tree_id = claimed.insert(root.tree_id).then_some(root.tree_id);
        let placeholder = tree_id.unwrap_or(root.tree_id);

        let mut rows: Vec<StructuralUpdate> = Vec::new();
        let mut counter = 1i64;
        // (node, level, row index once its left edge is numbered)
        let mut stack: Vec<(&CategoryNode, i64, Option<usize>)> = vec![(root, 0, None)];

        while let Some((node, level, entered)) = stack.pop() {
            if let Some(index) = entered {
                rows[index].structure.right = counter;
                counter += 1;
                continue;
            }

            stack.push((node, level, Some(rows.len())));
            rows.push(StructuralUpdate {
                id: node.id.clone(),
                structure: NodeStructure {
                    parent_id: if level == 0 {
                        None
                    } else {
                        node.parent_id.clone()
                    },
                    tree_id: placeholder,
                    level,
                    left: counter,
                    right: 0,
                },
            });
            counter += 1;
            visited += 1;

            if let Some(kids) = children.get(node.id.as_str()) {
                for child in kids.iter().rev() {
                    stack.push((*child, level + 1, None));
                }
            }
        }

        trees.push(RebuiltTree {
            root_id: root.id.clone(),
            tree_id,
            rows,
        });
    }

    if visited != nodes.len() {
        return Err(EncodingError::UnreachableNodes(nodes.len() - visited));
    }

    Ok(trees)
}
