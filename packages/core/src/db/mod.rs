//! Database Layer
//!
//! This module owns durable category storage:
//!
//! - [`CategoryStore`] - the persistence contract the service layer talks to
//! - [`MemoryStore`] - in-process backend for tests and ephemeral use
//! - [`TursoStore`] - embedded libsql/Turso backend (feature `turso`)
//! - [`CategoryEvent`] - domain events broadcast after committed mutations
//!
//! # Architecture
//!
//! Stores are dumb: they persist rows and commit [`ChangeSet`]s atomically.
//! All encoding arithmetic, validation and locking lives above them in
//! `operations` and `services`.

mod category_store;
mod error;
pub mod events;
mod memory_store;
#[cfg(feature = "turso")]
mod turso_store;

pub use category_store::{CategoryStore, ChangeSet};
pub use error::DatabaseError;
pub use events::CategoryEvent;
pub use memory_store::MemoryStore;
#[cfg(feature = "turso")]
pub use turso_store::TursoStore;
