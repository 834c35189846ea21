//! Domain Events for the Category Service
//!
//! Events are emitted over a tokio broadcast channel after a mutation has been
//! committed, so subscribers never observe a change that was rolled back.
//! Cache invalidation happens before the event is sent; a subscriber that
//! reacts by reading through the cache sees the new state.

use crate::models::CategoryNode;
use serde::{Deserialize, Serialize};

/// Domain events emitted by `CategoryService`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CategoryEvent {
    /// A category was created
    #[serde(rename = "created")]
    Created(CategoryNode),

    /// Display fields (title, slug, icon, ...) changed
    #[serde(rename = "updated")]
    Updated(CategoryNode),

    /// A subtree was reattached elsewhere
    #[serde(rename = "moved", rename_all = "camelCase")]
    Moved {
        node: CategoryNode,
        from_parent_id: Option<String>,
        to_parent_id: Option<String>,
    },

    /// A category (and, for cascading deletes, its subtree) was removed
    #[serde(rename = "deleted", rename_all = "camelCase")]
    Deleted { id: String, deleted_ids: Vec<String> },

    /// The whole forest was re-encoded from parent links
    #[serde(rename = "rebuilt", rename_all = "camelCase")]
    Rebuilt { tree_count: usize },
}

impl CategoryEvent {
    pub fn event_type(&self) -> &str {
        match self {
            CategoryEvent::Created(_) => "category:created",
            CategoryEvent::Updated(_) => "category:updated",
            CategoryEvent::Moved { .. } => "category:moved",
            CategoryEvent::Deleted { .. } => "category:deleted",
            CategoryEvent::Rebuilt { .. } => "forest:rebuilt",
        }
    }

    /// Id of the category the event is about, if it names one
    pub fn category_id(&self) -> Option<&str> {
        match self {
            CategoryEvent::Created(node) | CategoryEvent::Updated(node) => Some(&node.id),
            CategoryEvent::Moved { node, .. } => Some(&node.id),
            CategoryEvent::Deleted { id, .. } => Some(id),
            CategoryEvent::Rebuilt { .. } => None,
        }
    }
}
