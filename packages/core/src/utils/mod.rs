//! Utility functions for the taxonomy core
//!
//! This module provides helpers used across the codebase.

mod slug;

pub use slug::{SlugGenerator, DEFAULT_SLUG_MAX_LENGTH, FALLBACK_SLUG};
