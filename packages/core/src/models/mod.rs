//! Data Models
//!
//! This module contains the data structures used throughout the taxonomy:
//!
//! - `CategoryNode` - the persisted category row with its bound encoding
//! - Parameter and update types consumed by the service layer
//! - Derived views (tree, breadcrumb, statistics) produced for presentation

mod category;
mod views;

pub use category::{
    CategoryNode, CategoryUpdate, CreateCategoryParams, DeleteResult, FieldUpdate, MovePosition,
    NodeStructure, StructuralUpdate,
};
pub use views::{
    build_forest, BreadcrumbEntry, CategoryImport, CategoryStats, CategoryTreeNode,
    ForestStatistics,
};
