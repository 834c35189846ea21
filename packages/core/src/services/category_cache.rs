//! Read-through Cache for Derived Category Views
//!
//! Caches the forest tree, root list, forest statistics, per-node subtrees and
//! per-node breadcrumbs. None of these is ever the source of truth; dropping
//! everything only costs a reload.
//!
//! # Architecture
//!
//! - [`CacheBackend`] is the key/value contract (`get`, `set` with a TTL,
//!   `invalidate`, `invalidate_prefix`). [`MemoryCache`] is the in-process
//!   implementation.
//! - [`CategoryCache`] sits on top, maps [`CacheView`]s to keys under the
//!   `taxonomy:` prefix and remembers which per-node views it populated so
//!   invalidation can target them.
//!
//! # Cache Invalidation
//!
//! Invalidation is event-driven, with the TTL only as a backstop:
//! - **Structural** (create, move, delete): forest, roots and statistics are
//!   dropped; a subtree entry is dropped when its node's pre-mutation interval
//!   overlaps a mutated region; a breadcrumb entry is dropped when its node
//!   lay inside one.
//! - **Field update**: forest, the root list (for roots), subtrees of the
//!   node and its ancestors, breadcrumbs of the node and its descendants.
//!
//! # Load Races
//!
//! A reader captures [`CategoryCache::generation`] before loading from the
//! store. Every invalidation bumps the generation under the same gate that
//! `put` takes, so a view loaded before an invalidation is discarded instead
//! of being written back over it.

use crate::models::NodeStructure;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Prefix shared by every key this crate writes
pub const CACHE_KEY_PREFIX: &str = "taxonomy:";

/// Default time-to-live for cached views
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Key/value cache contract
///
/// Failures are swallowed by implementations: a cache that cannot answer
/// behaves like a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);

    /// Drop one key
    async fn invalidate(&self, key: &str);

    /// Drop every key starting with `prefix`. Returns the number dropped.
    async fn invalidate_prefix(&self, prefix: &str) -> usize;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process TTL cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict lazily
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }
}

/// A cacheable derived view
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheView {
    /// Every tree of the forest, nested
    Forest,
    /// Root categories
    Roots,
    /// Forest-wide statistics
    Stats,
    /// Nested subtree rooted at a category
    Subtree(String),
    /// Root-to-node breadcrumb of a category
    Breadcrumb(String),
}

impl CacheView {
    pub fn key(&self) -> String {
        match self {
            CacheView::Forest => format!("{}forest", CACHE_KEY_PREFIX),
            CacheView::Roots => format!("{}roots", CACHE_KEY_PREFIX),
            CacheView::Stats => format!("{}stats", CACHE_KEY_PREFIX),
            CacheView::Subtree(id) => format!("{}subtree:{}", CACHE_KEY_PREFIX, id),
            CacheView::Breadcrumb(id) => format!("{}breadcrumb:{}", CACHE_KEY_PREFIX, id),
        }
    }
}

/// Part of a tree's bound space touched by a structural mutation
///
/// Coordinates are pre-mutation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub tree_id: i64,
    pub left: i64,
    pub right: i64,
}

impl Region {
    /// The edge where a single node was inserted
    pub fn point(tree_id: i64, at: i64) -> Self {
        Self {
            tree_id,
            left: at,
            right: at,
        }
    }

    pub fn of(structure: &NodeStructure) -> Self {
        Self {
            tree_id: structure.tree_id,
            left: structure.left,
            right: structure.right,
        }
    }

    fn overlaps(&self, node: &NodeStructure) -> bool {
        node.tree_id == self.tree_id && self.left <= node.right && node.left <= self.right
    }

    fn encloses(&self, node: &NodeStructure) -> bool {
        node.tree_id == self.tree_id && self.left <= node.left && node.right <= self.right
    }
}

/// Entry counts per view kind plus hit/miss counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub forest: bool,
    pub roots: bool,
    pub stats: bool,
    pub subtrees: usize,
    pub breadcrumbs: usize,
    pub hits: u64,
    pub misses: u64,
    pub generation: u64,
}

/// Typed facade over a [`CacheBackend`]
pub struct CategoryCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    /// Views this facade wrote and has not invalidated since
    tracked: Mutex<HashSet<CacheView>>,
    generation: AtomicU64,
    /// Serializes `put` against invalidation
    gate: tokio::sync::Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CategoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryCache")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation())
            .finish()
    }
}

impl Default for CategoryCache {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCache::new()), DEFAULT_CACHE_TTL)
    }
}

impl CategoryCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            tracked: Mutex::new(HashSet::new()),
            generation: AtomicU64::new(0),
            gate: tokio::sync::Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current invalidation generation; capture before loading a view
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn tracked(&self) -> std::sync::MutexGuard<'_, HashSet<CacheView>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached value for `view`, if present and decodable
    pub async fn get<T: DeserializeOwned>(&self, view: &CacheView) -> Option<T> {
        let key = view.key();
        let Some(value) = self.backend.get(&key).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache miss: {}", key);
            return None;
        };

        match serde_json::from_value(value) {
            Ok(decoded) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit: {}", key);
                Some(decoded)
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.backend.invalidate(&key).await;
                self.tracked().remove(view);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a view loaded at `generation`.
    ///
    /// Returns false (and stores nothing) when an invalidation happened since
    /// the generation was captured.
    pub async fn put<T: Serialize>(&self, view: CacheView, value: &T, generation: u64) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Not caching {}: {}", view.key(), e);
                return false;
            }
        };

        let _gate = self.gate.lock().await;
        if self.generation() != generation {
            tracing::debug!("Skipping stale cache fill: {}", view.key());
            return false;
        }
        self.backend.set(&view.key(), value, self.ttl).await;
        self.tracked().insert(view);
        true
    }

    /// Drop the given views plus every tracked view matching `predicate`.
    /// Returns the number of views dropped.
    pub async fn invalidate_where<F>(&self, views: &[CacheView], predicate: F) -> usize
    where
        F: Fn(&CacheView) -> bool,
    {
        let _gate = self.gate.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        let doomed: Vec<CacheView> = {
            let mut tracked = self.tracked();
            let mut doomed: Vec<CacheView> = tracked
                .iter()
                .filter(|view| views.contains(view) || predicate(view))
                .cloned()
                .collect();
            for view in views {
                if !doomed.contains(view) {
                    doomed.push(view.clone());
                }
            }
            for view in &doomed {
                tracked.remove(view);
            }
            doomed
        };

        for view in &doomed {
            self.backend.invalidate(&view.key()).await;
        }
        doomed.len()
    }

    /// Invalidate after create, move or delete.
    ///
    /// `locate` resolves a node id to its pre-mutation structure; ids it cannot
    /// resolve belong to trees the mutation did not touch and are kept.
    pub async fn invalidate_structural<F>(&self, regions: &[Region], locate: F) -> usize
    where
        F: Fn(&str) -> Option<NodeStructure>,
    {
        let dropped = self
            .invalidate_where(
                &[CacheView::Forest, CacheView::Roots, CacheView::Stats],
                |view| match view {
                    CacheView::Subtree(id) => locate(id)
                        .map(|s| regions.iter().any(|r| r.overlaps(&s)))
                        .unwrap_or(false),
                    CacheView::Breadcrumb(id) => locate(id)
                        .map(|s| regions.iter().any(|r| r.encloses(&s)))
                        .unwrap_or(false),
                    _ => false,
                },
            )
            .await;
        tracing::debug!("Structural invalidation dropped {} cache view(s)", dropped);
        dropped
    }

    /// Invalidate after a display-field change of `node`.
    ///
    /// Statistics do not depend on display fields and are kept.
    pub async fn invalidate_fields<F>(&self, node: &NodeStructure, locate: F) -> usize
    where
        F: Fn(&str) -> Option<NodeStructure>,
    {
        let mut views = vec![CacheView::Forest];
        if node.parent_id.is_none() {
            views.push(CacheView::Roots);
        }

        let region = Region::of(node);
        let dropped = self
            .invalidate_where(&views, |view| match view {
                // Ancestors and self contain the node's interval
                CacheView::Subtree(id) => locate(id)
                    .map(|s| s.tree_id == node.tree_id && s.left <= node.left && node.right <= s.right)
                    .unwrap_or(false),
                // Self and descendants lie inside it
                CacheView::Breadcrumb(id) => {
                    locate(id).map(|s| region.encloses(&s)).unwrap_or(false)
                }
                _ => false,
            })
            .await;
        tracing::debug!("Field invalidation dropped {} cache view(s)", dropped);
        dropped
    }

    /// Drop everything under the cache prefix, tracked or not
    pub async fn clear(&self) -> usize {
        let _gate = self.gate.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tracked().clear();
        self.backend.invalidate_prefix(CACHE_KEY_PREFIX).await
    }

    pub fn stats(&self) -> CacheStats {
        let tracked = self.tracked();
        CacheStats {
            forest: tracked.contains(&CacheView::Forest),
            roots: tracked.contains(&CacheView::Roots),
            stats: tracked.contains(&CacheView::Stats),
            subtrees: tracked
                .iter()
                .filter(|v| matches!(v, CacheView::Subtree(_)))
                .count(),
            breadcrumbs: tracked
                .iter()
                .filter(|v| matches!(v, CacheView::Breadcrumb(_)))
                .count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generation: self.generation(),
        }
    }
}
