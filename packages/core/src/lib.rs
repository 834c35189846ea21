//! Taxonomy Core Business Logic Layer
//!
//! This crate manages a forest of hierarchical categories with unique slugs
//! and unbounded depth, optimized for read-heavy use.
//!
//! # Architecture
//!
//! - **Bound encoding**: every node stores a preorder interval (`left`, `right`)
//!   plus `tree_id` and `level`, so ancestor, descendant and breadcrumb queries
//!   are single range scans
//! - **Atomic structural writes**: bound shifts and row changes commit as one
//!   change set, serialized per tree
//! - **Disposable cache**: derived views are cached and invalidated precisely
//!   on every mutation; the store is the only source of truth
//!
//! # Modules
//!
//! - [`models`] - Data structures (CategoryNode, views, request types)
//! - [`operations`] - Tree encoder, per-tree locks, integrity checks
//! - [`services`] - CategoryService, cache facade, breadcrumbs, statistics
//! - [`db`] - Persistence contract with in-memory and libsql backends
//! - [`config`] - Runtime configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::TaxonomyConfig;
pub use models::*;
pub use services::*;
