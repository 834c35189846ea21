//! Tree Operations
//!
//! Pure, storage-agnostic building blocks for structural mutations:
//!
//! - [`TreeWorkspace`] - the bound encoder (insert / detach / reattach)
//! - [`TreeLocks`] - per-tree mutual exclusion for writers
//! - [`check_tree`] / [`plan_rebuild`] - integrity verification and repair
//!
//! Nothing here talks to storage. The service layer loads snapshots, runs the
//! primitives, and commits the resulting difference atomically.

mod error;
pub mod integrity;
pub mod tree_encoder;
pub mod tree_locks;

pub use error::EncodingError;
pub use integrity::{check_tree, plan_rebuild, IntegrityViolation, RebuiltTree};
pub use tree_encoder::{DetachedSubtree, TreeWorkspace, WorkspaceChanges};
pub use tree_locks::{TreeGuards, TreeLocks};
