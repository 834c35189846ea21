//! Service Layer Error Types
//!
//! This module defines the error type returned by every `CategoryService`
//! operation. Request-shape problems get their own variants so callers can
//! match on them; storage and encoding failures are folded into `Internal`.

use crate::db::DatabaseError;
use crate::operations::EncodingError;
use thiserror::Error;

/// Storage-layer failure behind an `Internal` error
#[derive(Error, Debug)]
pub enum InternalError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Bound encoding is inconsistent: {0}")]
    Encoding(#[from] EncodingError),
}

/// Service operation errors
#[derive(Error, Debug)]
pub enum CategoryServiceError {
    /// Referenced parent does not exist
    #[error("Parent category not found: {parent_id}")]
    ParentNotFound { parent_id: String },

    /// Slug is taken (or every suffix within the retry budget is)
    #[error("Slug already in use: {slug}")]
    SlugConflict { slug: String },

    /// Target parent is the node itself or one of its descendants
    #[error("Cannot move category {id} under {parent_id}: target lies inside its own subtree")]
    CyclicMove { id: String, parent_id: String },

    /// Non-forced delete of a category that still has children
    #[error("Category {id} has {children} descendant(s); use force to delete the subtree")]
    HasChildren { id: String, children: i64 },

    /// Addressed category does not exist
    #[error("Category not found: {id}")]
    NotFound { id: String },

    /// Request field failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Sibling anchor is not a child of the target parent
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Storage or encoding failure; the operation was rolled back
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

impl From<DatabaseError> for CategoryServiceError {
    fn from(err: DatabaseError) -> Self {
        Self::Internal(InternalError::Database(err))
    }
}

impl From<EncodingError> for CategoryServiceError {
    fn from(err: EncodingError) -> Self {
        Self::Internal(InternalError::Encoding(err))
    }
}

impl CategoryServiceError {
    /// Create a parent not found error
    pub fn parent_not_found(parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent_id: parent_id.into(),
        }
    }

    /// Create a slug conflict error
    pub fn slug_conflict(slug: impl Into<String>) -> Self {
        Self::SlugConflict { slug: slug.into() }
    }

    /// Create a cyclic move error
    pub fn cyclic_move(id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::CyclicMove {
            id: id.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Create a has children error
    pub fn has_children(id: impl Into<String>, children: i64) -> Self {
        Self::HasChildren {
            id: id.into(),
            children,
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid position error
    pub fn invalid_position(msg: impl Into<String>) -> Self {
        Self::InvalidPosition(msg.into())
    }

    /// True for storage/encoding failures, false for request-shape errors
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
