//! Derived read views
//!
//! These are the shapes handed to presentation collaborators. They are built
//! from preorder-sorted node lists and are safe to cache: none of them is ever
//! the source of truth.

use crate::models::CategoryNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nested tree view of a category and its descendants.
///
/// `children` is ordered by `left` and is an empty list for leaves, never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: String,
    pub image_url: Option<String>,
    pub level: i64,
    pub parent_id: Option<String>,
    pub children: Vec<CategoryTreeNode>,
}

impl From<&CategoryNode> for CategoryTreeNode {
    fn from(node: &CategoryNode) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            slug: node.slug.clone(),
            icon: node.icon.clone(),
            description: node.description.clone(),
            image_url: node.image_ref.clone(),
            level: node.level,
            parent_id: node.parent_id.clone(),
            children: Vec::new(),
        }
    }
}

impl CategoryTreeNode {
    /// Total number of nodes in this view, including itself
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTreeNode::size).sum::<usize>()
    }
}

/// One step of a root-to-node breadcrumb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbEntry {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub level: i64,
}

impl From<&CategoryNode> for BreadcrumbEntry {
    fn from(node: &CategoryNode) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            slug: node.slug.clone(),
            level: node.level,
        }
    }
}

/// Forest-wide aggregate metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestStatistics {
    pub total_categories: usize,
    pub root_categories: usize,
    pub leaf_categories: usize,
    /// `max(level) + 1`, or 0 for an empty forest
    pub max_depth: usize,
    /// Level number → node count at that level
    pub levels: BTreeMap<i64, usize>,
    pub categories_with_children: usize,
    /// Average branching factor among nodes with at least one child
    pub avg_children: f64,
}

/// Per-node statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub id: String,
    pub title: String,
    pub level: i64,
    pub children_count: usize,
    pub descendants_count: i64,
    pub siblings_count: usize,
    pub is_leaf: bool,
    pub is_root: bool,
    /// Breadcrumb titles joined with `" > "`
    pub path: String,
}

/// Nested input for bulk imports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryImport {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub children: Vec<CategoryImport>,
}

struct Frame {
    view: CategoryTreeNode,
    tree_id: i64,
    right: i64,
}

/// Assemble nested views from nodes sorted by `(tree_id, left)`.
///
/// Works for the whole forest or for a single subtree (the subtree root must
/// come first). Nesting is derived purely from the bounds, so this is a single
/// linear pass with an explicit stack.
pub fn build_forest(nodes: &[CategoryNode]) -> Vec<CategoryTreeNode> {
    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for node in nodes {
        loop {
            let closes = match stack.last() {
                Some(top) => top.tree_id != node.tree_id || node.left > top.right,
                None => false,
            };
            if !closes {
                break;
            }
            if let Some(frame) = stack.pop() {
                attach(&mut stack, &mut roots, frame.view);
            }
        }
        stack.push(Frame {
            view: CategoryTreeNode::from(node),
            tree_id: node.tree_id,
            right: node.right,
        });
    }

    while let Some(frame) = stack.pop() {
        attach(&mut stack, &mut roots, frame.view);
    }

    roots
}

fn attach(stack: &mut [Frame], roots: &mut Vec<CategoryTreeNode>, view: CategoryTreeNode) {
    match stack.last_mut() {
        Some(parent) => parent.view.children.push(view),
        None => roots.push(view),
    }
}
