//! MemoryStore - in-process CategoryStore
//!
//! Rows live in a `HashMap` behind a tokio `RwLock`. `apply` stages the whole
//! change set on a scratch copy and only swaps it in once every check passed,
//! so a rejected change set leaves the previous state untouched.
//!
//! Used when no database path is configured and throughout the test suite.

use crate::db::{CategoryStore, ChangeSet, DatabaseError};
use crate::models::CategoryNode;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<String, CategoryNode>,
    next_tree_id: i64,
}

/// In-memory category store
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                rows: HashMap::new(),
                next_tree_id: 1,
            }),
        }
    }

    async fn collect<F>(&self, filter: F) -> Vec<CategoryNode>
    where
        F: Fn(&CategoryNode) -> bool,
    {
        let state = self.state.read().await;
        let mut rows: Vec<CategoryNode> = state.rows.values().filter(|n| filter(n)).cloned().collect();
        rows.sort_by_key(|n| (n.tree_id, n.left));
        rows
    }
}

fn stage(rows: &mut HashMap<String, CategoryNode>, changes: ChangeSet) -> Result<(), DatabaseError> {
    for id in &changes.deletes {
        if rows.remove(id).is_none() {
            return Err(DatabaseError::row_not_found(id.clone()));
        }
    }

    for update in changes.structural_updates {
        let row = rows
            .get_mut(&update.id)
            .ok_or_else(|| DatabaseError::row_not_found(update.id.clone()))?;
        row.apply_structure(&update.structure);
    }

    for update in changes.field_updates {
        let row = rows
            .get_mut(&update.id)
            .ok_or_else(|| DatabaseError::row_not_found(update.id.clone()))?;
        row.title = update.title;
        row.slug = update.slug;
        row.icon = update.icon;
        row.description = update.description;
        row.image_ref = update.image_ref;
        row.updated_at = update.updated_at;
    }

    for node in changes.inserts {
        if rows.contains_key(&node.id) {
            return Err(DatabaseError::constraint_violation(format!(
                "duplicate id {}",
                node.id
            )));
        }
        rows.insert(node.id.clone(), node);
    }

    let mut slugs = HashSet::with_capacity(rows.len());
    for row in rows.values() {
        if !slugs.insert(row.slug.as_str()) {
            return Err(DatabaseError::constraint_violation(format!(
                "duplicate slug {}",
                row.slug
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<CategoryNode>, DatabaseError> {
        Ok(self.state.read().await.rows.get(id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<CategoryNode>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.rows.values().find(|n| n.slug == slug).cloned())
    }

    async fn slug_exists(
        &self,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .any(|n| n.slug == slug && Some(n.id.as_str()) != exclude_id))
    }

    async fn get_by_tree_id(&self, tree_id: i64) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self.collect(|n| n.tree_id == tree_id).await)
    }

    async fn list_all(&self) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self.collect(|_| true).await)
    }

    async fn get_roots(&self) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self.collect(|n| n.parent_id.is_none()).await)
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self
            .collect(|n| n.parent_id.as_deref() == Some(parent_id))
            .await)
    }

    async fn get_ancestors(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self
            .collect(|n| n.tree_id == tree_id && n.left < left && n.right > right)
            .await)
    }

    async fn get_descendants(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        Ok(self
            .collect(|n| n.tree_id == tree_id && n.left > left && n.right < right)
            .await)
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<CategoryNode>, DatabaseError> {
        let needle = term.to_lowercase();
        let mut hits = self.collect(|n| n.matches_search(&needle)).await;
        hits.sort_by(|a, b| (a.level, &a.title).cmp(&(b.level, &b.title)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, DatabaseError> {
        Ok(self.state.read().await.rows.len())
    }

    async fn allocate_tree_id(&self) -> Result<i64, DatabaseError> {
        let mut state = self.state.write().await;
        let tree_id = state.next_tree_id;
        state.next_tree_id += 1;
        Ok(tree_id)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let mut scratch = state.rows.clone();
        stage(&mut scratch, changes)?;
        state.rows = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeStructure, StructuralUpdate};

    fn node(slug: &str, tree_id: i64, left: i64, right: i64) -> CategoryNode {
        let mut node = CategoryNode::new(slug.to_string(), slug.to_string());
        node.tree_id = tree_id;
        node.left = left;
        node.right = right;
        node
    }

    #[tokio::test]
    async fn test_tree_ids_are_never_reused() {
        let store = MemoryStore::new();
        let first = store.allocate_tree_id().await.unwrap();
        let second = store.allocate_tree_id().await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_failed_change_set_is_not_applied() {
        let store = MemoryStore::new();
        let root = node("root", 1, 1, 2);
        store.insert(root.clone()).await.unwrap();

        let err = store
            .apply(ChangeSet {
                structural_updates: vec![StructuralUpdate {
                    id: root.id.clone(),
                    structure: NodeStructure {
                        parent_id: None,
                        tree_id: 1,
                        level: 0,
                        left: 1,
                        right: 4,
                    },
                }],
                inserts: vec![node("root", 1, 2, 3)],
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::ConstraintViolation { .. }));
        let stored = store.get_by_id(&root.id).await.unwrap().unwrap();
        assert_eq!(stored.right, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_range_queries() {
        let store = MemoryStore::new();
        let mut root = node("root", 1, 1, 6);
        let mut child = node("child", 1, 2, 5);
        let grandchild = {
            let mut n = node("grandchild", 1, 3, 4);
            n.level = 2;
            n.parent_id = Some(child.id.clone());
            n
        };
        child.level = 1;
        child.parent_id = Some(root.id.clone());
        root.description = "Top level électronique".to_string();

        store
            .apply(ChangeSet {
                inserts: vec![root.clone(), child.clone(), grandchild.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        let ancestors = store.get_ancestors(1, 3, 4).await.unwrap();
        assert_eq!(
            ancestors.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec![root.id.as_str(), child.id.as_str()]
        );

        let descendants = store.get_descendants(1, 1, 6).await.unwrap();
        assert_eq!(descendants.len(), 2);

        let hits = store.search("TOP", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.search("ÉLECTRONIQUE", 10).await.unwrap().len(), 1);
        assert!(store.slug_exists("child", None).await.unwrap());
        assert!(!store.slug_exists("child", Some(&child.id)).await.unwrap());
        assert_eq!(store.get_children(&root.id).await.unwrap().len(), 1);
    }

    #[test]
    fn test_delete_of_missing_row_fails() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let err = store.delete("ghost").await.unwrap_err();
            assert!(matches!(err, DatabaseError::RowNotFound { .. }));
            assert!(store.list_all().await.unwrap().is_empty());
        });
    }
}
