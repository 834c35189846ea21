//! Business Services
//!
//! This module contains the category service and its collaborators:
//!
//! - `CategoryService` - create / update / move / delete plus every read path
//! - `CategoryCache` - read-through cache of derived views with targeted invalidation
//! - `BreadcrumbResolver` - ancestor chains from a single range query
//! - `forest_statistics` - forest-wide aggregate metrics
//!
//! Services coordinate between the database layer and the pure tree
//! operations, enforcing the request-level rules (parents exist, slugs are
//! unique, moves are acyclic) before anything is written.

pub mod breadcrumb;
pub mod category_cache;
mod category_reads;
pub mod category_service;
pub mod error;
pub mod statistics;

pub use breadcrumb::{join_path, BreadcrumbResolver, PATH_SEPARATOR};
pub use category_cache::{
    CacheBackend, CacheStats, CacheView, CategoryCache, MemoryCache, Region, CACHE_KEY_PREFIX,
    DEFAULT_CACHE_TTL,
};
pub use category_reads::{DEFAULT_SEARCH_LIMIT, MIN_SEARCH_LENGTH};
pub use category_service::{BulkCreateResult, CategoryService, RebuildReport};
pub use error::{CategoryServiceError, InternalError};
pub use statistics::forest_statistics;
