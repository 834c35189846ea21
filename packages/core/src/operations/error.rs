//! Error types for the tree encoding layer
//!
//! An `EncodingError` means the bound encoding loaded from storage does not
//! match what a structural operation expects. It never describes a bad request:
//! request validation happens in the service layer before any plan is built.

use thiserror::Error;

/// Errors raised while planning a structural change
///
/// # Examples
///
/// ```rust
/// use taxonomy_core::operations::EncodingError;
///
/// let err = EncodingError::NodeNotLoaded { node_id: "abc".to_string() };
/// assert!(err.to_string().contains("abc"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The node is not part of any tree loaded into the workspace
    #[error("Node '{node_id}' is not loaded in the tree workspace")]
    NodeNotLoaded { node_id: String },

    /// A row handed to `load_tree` carries a different tree id
    #[error("Node '{node_id}' belongs to tree {actual}, not tree {expected}")]
    NodeOutsideTree {
        node_id: String,
        expected: i64,
        actual: i64,
    },

    /// The same id appears twice in the workspace
    #[error("Node '{node_id}' was loaded twice")]
    DuplicateNode { node_id: String },

    /// Inserting a root requires a freshly allocated tree id
    #[error("Node '{node_id}' becomes a root but no tree id was allocated")]
    MissingTreeId { node_id: String },

    /// The freshly allocated tree id already has rows
    #[error("Tree {tree_id} is not empty")]
    TreeNotEmpty { tree_id: i64 },

    /// Sibling anchor is not a child of the target parent
    #[error("Node '{anchor_id}' is not a child of '{parent_id}'")]
    InvalidAnchor { anchor_id: String, parent_id: String },

    /// Parent links contain a cycle or point nowhere
    #[error("Parent links do not form a forest: {0} node(s) unreachable from any root")]
    UnreachableNodes(usize),
}
