//! Breadcrumb resolution
//!
//! The ancestor chain of a node is every row of the same tree whose interval
//! strictly encloses the node's interval. That is one range query, ordered by
//! `left`, with no recursion and no per-level lookups.

use crate::db::{CategoryStore, DatabaseError};
use crate::models::{BreadcrumbEntry, CategoryNode};

/// Separator used by [`BreadcrumbResolver::path`]
pub const PATH_SEPARATOR: &str = " > ";

/// Resolves ancestor chains through the persistence contract
pub struct BreadcrumbResolver<'a> {
    store: &'a dyn CategoryStore,
}

impl<'a> BreadcrumbResolver<'a> {
    pub fn new(store: &'a dyn CategoryStore) -> Self {
        Self { store }
    }

    /// Ancestors of `node`, root first, excluding the node itself
    pub async fn ancestors_of(
        &self,
        node: &CategoryNode,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        if node.is_root() {
            return Ok(Vec::new());
        }
        self.store
            .get_ancestors(node.tree_id, node.left, node.right)
            .await
    }

    /// Root-to-node chain including both endpoints
    pub async fn breadcrumb(
        &self,
        node: &CategoryNode,
    ) -> Result<Vec<BreadcrumbEntry>, DatabaseError> {
        let ancestors = self.ancestors_of(node).await?;
        Ok(ancestors
            .iter()
            .chain(std::iter::once(node))
            .map(BreadcrumbEntry::from)
            .collect())
    }

    /// Breadcrumb titles joined with `" > "`
    pub async fn path(&self, node: &CategoryNode) -> Result<String, DatabaseError> {
        Ok(join_path(&self.breadcrumb(node).await?))
    }
}

pub fn join_path(entries: &[BreadcrumbEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.title.as_str())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ChangeSet, MemoryStore};

    fn node(title: &str, parent: Option<&CategoryNode>, left: i64, right: i64) -> CategoryNode {
        let mut node = CategoryNode::new(title.to_string(), title.to_lowercase());
        node.tree_id = 1;
        node.left = left;
        node.right = right;
        if let Some(parent) = parent {
            node.parent_id = Some(parent.id.clone());
            node.level = parent.level + 1;
        }
        node
    }

    #[tokio::test]
    async fn test_breadcrumb_is_root_first_and_inclusive() {
        let store = MemoryStore::new();
        let electronics = node("Electronics", None, 1, 8);
        let phones = node("Phones", Some(&electronics), 2, 5);
        let smartphones = node("Smartphones", Some(&phones), 3, 4);
        let audio = node("Audio", Some(&electronics), 6, 7);
        store
            .apply(ChangeSet {
                inserts: vec![
                    electronics.clone(),
                    phones.clone(),
                    smartphones.clone(),
                    audio,
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        let resolver = BreadcrumbResolver::new(&store);
        let crumbs = resolver.breadcrumb(&smartphones).await.unwrap();
        let titles: Vec<&str> = crumbs.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Electronics", "Phones", "Smartphones"]);
        assert_eq!(crumbs[2].level, 2);

        assert_eq!(
            resolver.path(&smartphones).await.unwrap(),
            "Electronics > Phones > Smartphones"
        );
    }

    #[tokio::test]
    async fn test_root_breadcrumb_is_single_entry() {
        let store = MemoryStore::new();
        let root = node("Electronics", None, 1, 2);
        store.insert(root.clone()).await.unwrap();

        let crumbs = BreadcrumbResolver::new(&store)
            .breadcrumb(&root)
            .await
            .unwrap();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].id, root.id);
    }
}
