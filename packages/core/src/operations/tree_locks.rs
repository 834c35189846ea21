//! Per-tree write locks
//!
//! Structural mutations rewrite a variable-width set of rows inside one tree,
//! so two mutations on the same `tree_id` must never interleave. Mutations on
//! disjoint trees proceed concurrently.
//!
//! Locks are always taken in ascending `tree_id` order, which makes cross-tree
//! moves (two trees locked at once) deadlock-free.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of lazily created per-tree mutexes
#[derive(Debug, Default)]
pub struct TreeLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held locks for a set of trees; released on drop
#[derive(Debug)]
pub struct TreeGuards {
    tree_ids: Vec<i64>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl TreeGuards {
    pub fn tree_ids(&self) -> &[i64] {
        &self.tree_ids
    }

    pub fn covers(&self, tree_id: i64) -> bool {
        self.tree_ids.binary_search(&tree_id).is_ok()
    }
}

impl TreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, tree_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(tree_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock every listed tree (duplicates ignored) in ascending order.
    pub async fn lock_trees(&self, tree_ids: &[i64]) -> TreeGuards {
        let mut ids = tree_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for tree_id in &ids {
            guards.push(self.handle(*tree_id).lock_owned().await);
        }

        TreeGuards {
            tree_ids: ids,
            _guards: guards,
        }
    }

    /// Drop registry entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
