//! Category Data Structures
//!
//! This module defines `CategoryNode`, the only persisted entity of the taxonomy,
//! together with the parameter and update types that flow through the service layer.
//!
//! # Bound Encoding
//!
//! Every node carries a preorder interval (`left`, `right`) plus the `tree_id`
//! of the rooted tree it belongs to and its `level` (depth from the root).
//! With those four numbers the common hierarchy questions become range checks:
//!
//! - `A` is an ancestor of `B` iff both share a `tree_id` and
//!   `A.left < B.left && B.right < A.right`
//! - descendant count is `(right - left - 1) / 2`
//! - a node is a leaf iff `right == left + 1`
//!
//! # Examples
//!
//! ```rust
//! use taxonomy_core::models::CategoryNode;
//!
//! let root = CategoryNode::new("Electronics".to_string(), "electronics".to_string());
//! assert!(root.is_root());
//! assert!(root.is_leaf());
//! assert_eq!(root.descendant_count(), 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A single category in the forest.
///
/// # Fields
///
/// - `id`: Stable identifier (UUID), immutable after creation
/// - `title`: Display name (1..=50 characters)
/// - `slug`: URL-safe identifier, unique across the whole forest
/// - `parent_id`: Parent category, `None` for roots
/// - `tree_id`, `level`, `left`, `right`: Bound encoding (see module docs)
/// - `icon`, `description`, `image_ref`: Display metadata, never read by tree logic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: String,

    pub title: String,

    pub slug: String,

    pub parent_id: Option<String>,

    /// Identifier of the rooted tree this node belongs to
    pub tree_id: i64,

    /// Depth from the root (root = 0)
    pub level: i64,

    /// Preorder left bound
    pub left: i64,

    /// Preorder right bound
    pub right: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Opaque reference to an uploaded image (resolved to a URL by presentation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl CategoryNode {
    /// Create a detached root-shaped node with a fresh UUID.
    ///
    /// The bound encoding is a placeholder (`tree_id = 0`, `1..2`) until the
    /// tree encoder places the node.
    pub fn new(title: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            slug,
            parent_id: None,
            tree_id: 0,
            level: 0,
            left: 1,
            right: 2,
            icon: None,
            description: String::new(),
            image_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }

    /// Number of nodes strictly below this one
    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    /// Interval width occupied by this node's subtree (`2 * subtree size`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Returns true if `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &CategoryNode) -> bool {
        self.tree_id == other.tree_id && self.left < other.left && other.right < self.right
    }

    pub fn is_descendant_of(&self, other: &CategoryNode) -> bool {
        other.is_ancestor_of(self)
    }

    /// Unicode case-insensitive substring match on title, slug or description.
    ///
    /// `needle` must already be lowercased with [`str::to_lowercase`].
    pub fn matches_search(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.slug.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }

    /// Snapshot of the structural columns
    pub fn structure(&self) -> NodeStructure {
        NodeStructure {
            parent_id: self.parent_id.clone(),
            tree_id: self.tree_id,
            level: self.level,
            left: self.left,
            right: self.right,
        }
    }

    /// Overwrite the structural columns with a planned structure
    pub fn apply_structure(&mut self, structure: &NodeStructure) {
        self.parent_id = structure.parent_id.clone();
        self.tree_id = structure.tree_id;
        self.level = structure.level;
        self.left = structure.left;
        self.right = structure.right;
    }
}

/// The structural columns of a node: everything a structural mutation may touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStructure {
    pub parent_id: Option<String>,
    pub tree_id: i64,
    pub level: i64,
    pub left: i64,
    pub right: i64,
}

impl NodeStructure {
    pub fn contains(&self, other: &NodeStructure) -> bool {
        self.tree_id == other.tree_id && self.left < other.left && other.right < self.right
    }

    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }
}

/// A planned rewrite of one node's structural columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralUpdate {
    pub id: String,
    #[serde(flatten)]
    pub structure: NodeStructure,
}

/// A full rewrite of one node's non-structural columns.
///
/// Values are already resolved (slug normalized and checked for uniqueness);
/// the persistence layer writes them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: String,
    pub image_ref: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FieldUpdate {
    pub fn from_node(node: &CategoryNode) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            slug: node.slug.clone(),
            icon: node.icon.clone(),
            description: node.description.clone(),
            image_ref: node.image_ref.clone(),
            updated_at: node.updated_at,
        }
    }
}

/// Parameters for creating a category
///
/// ```rust
/// # use taxonomy_core::models::CreateCategoryParams;
/// let params = CreateCategoryParams {
///     title: "Smartphones".to_string(),
///     parent_id: Some("phones-id".to_string()),
///     ..Default::default()
/// };
/// assert!(params.slug.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryParams {
    pub title: String,
    /// Explicit slug; derived from `title` when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl CreateCategoryParams {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

/// Deserializer for double-Option fields
///
/// - Missing field → None (don't update)
/// - null → Some(None) (set to NULL)
/// - "value" → Some(Some("value")) (set to value)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial category update
///
/// Only provided fields change. `parent_id` is not written directly: a change
/// there is executed as a move.
///
/// # Double-Option Pattern for Nullable Fields
///
/// - `None`: leave the column untouched
/// - `Some(None)`: clear it (for `parent_id`, turn the node into a root)
/// - `Some(Some(v))`: set it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub icon: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub image_ref: Option<Option<String>>,
}

impl CategoryUpdate {
    /// True when the update touches at least one non-structural column
    pub fn has_field_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.icon.is_some()
            || self.description.is_some()
            || self.image_ref.is_some()
    }
}

/// Where a node lands relative to its new parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "siblingId")]
pub enum MovePosition {
    /// Append after the existing children
    #[default]
    LastChild,
    /// Prepend before the existing children
    FirstChild,
    /// Immediately before the given sibling (a child of the new parent)
    Before(String),
    /// Immediately after the given sibling (a child of the new parent)
    After(String),
}

impl MovePosition {
    pub fn anchor(&self) -> Option<&str> {
        match self {
            MovePosition::Before(id) | MovePosition::After(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Result of a delete operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Every removed id, the requested node first
    pub deleted_ids: Vec<String>,
}

impl DeleteResult {
    pub fn deleted_count(&self) -> usize {
        self.deleted_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bounded(left: i64, right: i64, tree_id: i64) -> CategoryNode {
        let mut node = CategoryNode::new("Node".to_string(), format!("node-{}", left));
        node.left = left;
        node.right = right;
        node.tree_id = tree_id;
        node
    }

    #[test]
    fn test_descendant_count_from_bounds() {
        let root = bounded(1, 10, 1);
        assert_eq!(root.descendant_count(), 4);
        assert_eq!(root.width(), 10);
        assert!(!root.is_leaf());
        assert!(bounded(2, 3, 1).is_leaf());
    }

    #[test]
    fn test_search_match_folds_unicode_case() {
        let mut node = CategoryNode::new("ÉLECTRONIQUE".to_string(), "electronique".to_string());
        node.description = "Télévisions ET Audio".to_string();

        assert!(node.matches_search(&"électronique".to_lowercase()));
        assert!(node.matches_search(&"TÉLÉVISIONS".to_lowercase()));
        assert!(node.matches_search("tronique"));
        assert!(!node.matches_search("phones"));
    }

    #[test]
    fn test_ancestor_is_interval_containment() {
        let root = bounded(1, 10, 1);
        let child = bounded(2, 5, 1);
        let other_tree = bounded(2, 5, 2);

        assert!(root.is_ancestor_of(&child));
        assert!(child.is_descendant_of(&root));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&other_tree));
    }

    #[test]
    fn test_update_double_option_deserialization() {
        let update: CategoryUpdate = serde_json::from_value(json!({
            "title": "Phones",
            "parentId": null
        }))
        .unwrap();
        assert_eq!(update.title.as_deref(), Some("Phones"));
        assert_eq!(update.parent_id, Some(None));
        assert!(update.icon.is_none());

        let update: CategoryUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(update.parent_id.is_none());
        assert!(!update.has_field_changes());
    }

    #[test]
    fn test_move_position_serialization() {
        let position = MovePosition::Before("abc".to_string());
        let value = serde_json::to_value(&position).unwrap();
        assert_eq!(value, json!({"kind": "before", "siblingId": "abc"}));

        let parsed: MovePosition = serde_json::from_value(json!({"kind": "lastChild"})).unwrap();
        assert_eq!(parsed, MovePosition::LastChild);
    }
}
