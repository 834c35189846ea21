//! CategoryStore Trait - Persistence Contract
//!
//! This module defines the `CategoryStore` trait the service layer talks to.
//! It owns the durable category rows; nothing above it keeps node state
//! beyond a single operation.
//!
//! # Atomicity
//!
//! All writes funnel through [`CategoryStore::apply`], which commits a
//! [`ChangeSet`] all-or-nothing. A structural mutation inserts or deletes a
//! handful of rows *and* rewrites the bounds of a variable number of others;
//! committing those separately could leave a half-shifted encoding behind,
//! which silently corrupts every later ancestor/descendant query.
//!
//! # Examples
//!
//! ```rust
//! use taxonomy_core::db::{CategoryStore, MemoryStore};
//! use taxonomy_core::models::CategoryNode;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store = MemoryStore::new();
//! let mut root = CategoryNode::new("Electronics".into(), "electronics".into());
//! root.tree_id = store.allocate_tree_id().await?;
//! store.insert(root.clone()).await?;
//!
//! assert_eq!(store.get_by_slug("electronics").await?.unwrap().id, root.id);
//! # Ok(())
//! # }
//! ```

use crate::db::DatabaseError;
use crate::models::{CategoryNode, FieldUpdate, StructuralUpdate};
use async_trait::async_trait;

/// A batch of writes committed as one unit
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// New rows (full node, structure already placed)
    pub inserts: Vec<CategoryNode>,
    /// Structural column rewrites (`parent_id`, `tree_id`, `level`, `left`, `right`)
    pub structural_updates: Vec<StructuralUpdate>,
    /// Non-structural column rewrites
    pub field_updates: Vec<FieldUpdate>,
    /// Rows to remove
    pub deletes: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.structural_updates.is_empty()
            && self.field_updates.is_empty()
            && self.deletes.is_empty()
    }

    /// Total number of rows written
    pub fn len(&self) -> usize {
        self.inserts.len()
            + self.structural_updates.len()
            + self.field_updates.len()
            + self.deletes.len()
    }
}

/// Persistence contract for category rows
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the service shares one store across
/// every request task.
///
/// # Ordering
///
/// Methods returning several rows return them in preorder: by `left` within a
/// tree, and by `(tree_id, left)` across trees.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    //
    // POINT LOOKUPS
    //

    async fn get_by_id(&self, id: &str) -> Result<Option<CategoryNode>, DatabaseError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<CategoryNode>, DatabaseError>;

    /// True if any row other than `exclude_id` uses `slug`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<&str>)
        -> Result<bool, DatabaseError>;

    //
    // RANGE QUERIES
    //

    /// Every row of one tree, ordered by `left`
    async fn get_by_tree_id(&self, tree_id: i64) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Every row of the forest, ordered by `(tree_id, left)`
    async fn list_all(&self) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Rows with `parent_id IS NULL`, ordered by `tree_id`
    async fn get_roots(&self) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Direct children of `parent_id`, ordered by `left`
    async fn get_children(&self, parent_id: &str) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Rows strictly enclosing `[left, right]` in `tree_id`, root first
    async fn get_ancestors(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Rows strictly inside `[left, right]` in `tree_id`, in preorder
    async fn get_descendants(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError>;

    /// Case-insensitive substring match on title, slug and description,
    /// ordered by `(level, title)`
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<CategoryNode>, DatabaseError>;

    async fn count(&self) -> Result<usize, DatabaseError>;

    //
    // WRITES
    //

    /// Reserve a tree id that has never been handed out before
    async fn allocate_tree_id(&self) -> Result<i64, DatabaseError>;

    /// Commit a change set atomically. On error nothing is applied.
    async fn apply(&self, changes: ChangeSet) -> Result<(), DatabaseError>;

    async fn insert(&self, node: CategoryNode) -> Result<(), DatabaseError> {
        self.apply(ChangeSet {
            inserts: vec![node],
            ..Default::default()
        })
        .await
    }

    /// Bulk structural rewrite executed as one transaction
    async fn update_many(&self, updates: Vec<StructuralUpdate>) -> Result<(), DatabaseError> {
        self.apply(ChangeSet {
            structural_updates: updates,
            ..Default::default()
        })
        .await
    }

    async fn update_fields(&self, update: FieldUpdate) -> Result<(), DatabaseError> {
        self.apply(ChangeSet {
            field_updates: vec![update],
            ..Default::default()
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), DatabaseError> {
        self.apply(ChangeSet {
            deletes: vec![id.to_string()],
            ..Default::default()
        })
        .await
    }
}
