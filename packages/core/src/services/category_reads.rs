//! Category Service - Read Paths
//!
//! Cached views go through [`CategoryCache`](crate::services::CategoryCache)
//! unless the caller opts out with `use_cache = false`. On a miss the view is
//! rebuilt from range queries and written back, tagged with the cache
//! generation captured before the load.

use crate::models::{
    build_forest, BreadcrumbEntry, CategoryNode, CategoryStats, CategoryTreeNode,
    ForestStatistics,
};
use crate::operations::{check_tree, IntegrityViolation};
use crate::services::breadcrumb::{join_path, BreadcrumbResolver};
use crate::services::category_cache::{CacheStats, CacheView};
use crate::services::category_service::{CategoryService, Missing};
use crate::services::error::CategoryServiceError;
use crate::services::statistics::forest_statistics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;

/// Queries shorter than this (in characters) return nothing
pub const MIN_SEARCH_LENGTH: usize = 2;

/// Default result cap for [`CategoryService::search_categories`]
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

impl CategoryService {
    /// Serve `view` from the cache or load it with `load` and cache the result
    async fn cached<T, F, Fut>(
        &self,
        view: CacheView,
        use_cache: bool,
        load: F,
    ) -> Result<T, CategoryServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CategoryServiceError>>,
    {
        if !use_cache {
            return load().await;
        }
        if let Some(hit) = self.cache.get::<T>(&view).await {
            return Ok(hit);
        }

        let generation = self.cache.generation();
        let value = load().await?;
        self.cache.put(view, &value, generation).await;
        Ok(value)
    }

    //
    // POINT LOOKUPS
    //

    pub async fn get_category(&self, id: &str) -> Result<CategoryNode, CategoryServiceError> {
        self.fetch(id, Missing::Node).await
    }

    pub async fn get_category_by_slug(
        &self,
        slug: &str,
    ) -> Result<CategoryNode, CategoryServiceError> {
        self.store
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| CategoryServiceError::not_found(slug))
    }

    //
    // CACHED VIEWS
    //

    /// Every tree of the forest as nested views, trees ordered by `tree_id`
    pub async fn get_tree(
        &self,
        use_cache: bool,
    ) -> Result<Vec<CategoryTreeNode>, CategoryServiceError> {
        self.cached(CacheView::Forest, use_cache, || async move {
            let nodes = self.store.list_all().await?;
            Ok(build_forest(&nodes))
        })
        .await
    }

    /// Nested view of `id` and its descendants
    pub async fn get_subtree(
        &self,
        id: &str,
        use_cache: bool,
    ) -> Result<CategoryTreeNode, CategoryServiceError> {
        self.cached(CacheView::Subtree(id.to_string()), use_cache, || async move {
            let node = self.fetch(id, Missing::Node).await?;
            let descendants = self
                .store
                .get_descendants(node.tree_id, node.left, node.right)
                .await?;
            let mut rows = Vec::with_capacity(descendants.len() + 1);
            rows.push(node);
            rows.extend(descendants);
            build_forest(&rows)
                .into_iter()
                .next()
                .ok_or_else(|| CategoryServiceError::not_found(id))
        })
        .await
    }

    /// Root-to-node chain, both endpoints included
    pub async fn get_breadcrumb(
        &self,
        id: &str,
        use_cache: bool,
    ) -> Result<Vec<BreadcrumbEntry>, CategoryServiceError> {
        self.cached(CacheView::Breadcrumb(id.to_string()), use_cache, || async move {
            let node = self.fetch(id, Missing::Node).await?;
            Ok(BreadcrumbResolver::new(self.store.as_ref())
                .breadcrumb(&node)
                .await?)
        })
        .await
    }

    pub async fn get_statistics(
        &self,
        use_cache: bool,
    ) -> Result<ForestStatistics, CategoryServiceError> {
        self.cached(CacheView::Stats, use_cache, || async move {
            let nodes = self.store.list_all().await?;
            Ok(forest_statistics(&nodes))
        })
        .await
    }

    pub async fn get_roots(
        &self,
        use_cache: bool,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        self.cached(CacheView::Roots, use_cache, || async move {
            Ok(self.store.get_roots().await?)
        })
        .await
    }

    //
    // HIERARCHY QUERIES
    //

    /// Ancestors of `id`, root first, excluding the node itself
    pub async fn get_ancestors(&self, id: &str) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        Ok(BreadcrumbResolver::new(self.store.as_ref())
            .ancestors_of(&node)
            .await?)
    }

    /// Direct children in sibling order
    pub async fn get_children(&self, id: &str) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        self.fetch(id, Missing::Node).await?;
        Ok(self.store.get_children(id).await?)
    }

    /// Every descendant in preorder, optionally preceded by the node itself
    pub async fn get_descendants(
        &self,
        id: &str,
        include_self: bool,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        let descendants = self
            .store
            .get_descendants(node.tree_id, node.left, node.right)
            .await?;

        if include_self {
            let mut all = Vec::with_capacity(descendants.len() + 1);
            all.push(node);
            all.extend(descendants);
            Ok(all)
        } else {
            Ok(descendants)
        }
    }

    /// Nodes sharing the parent of `id` (roots are siblings of each other)
    pub async fn get_siblings(
        &self,
        id: &str,
        include_self: bool,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        let siblings = match &node.parent_id {
            Some(parent_id) => self.store.get_children(parent_id).await?,
            None => self.store.get_roots().await?,
        };

        Ok(siblings
            .into_iter()
            .filter(|s| include_self || s.id != node.id)
            .collect())
    }

    /// Case-insensitive substring search on title, slug and description,
    /// ordered by level then title
    pub async fn search_categories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LENGTH || limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.store.search(query, limit).await?)
    }

    /// Breadcrumb titles joined with `" > "`
    pub async fn category_path(&self, id: &str) -> Result<String, CategoryServiceError> {
        Ok(join_path(&self.get_breadcrumb(id, true).await?))
    }

    pub async fn category_stats(&self, id: &str) -> Result<CategoryStats, CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        let children = self.store.get_children(id).await?;
        let siblings = self.get_siblings(id, false).await?;
        let path = join_path(&self.get_breadcrumb(id, true).await?);

        Ok(CategoryStats {
            id: node.id.clone(),
            title: node.title.clone(),
            level: node.level,
            children_count: children.len(),
            descendants_count: node.descendant_count(),
            siblings_count: siblings.len(),
            is_leaf: node.is_leaf(),
            is_root: node.is_root(),
            path,
        })
    }

    /// Nested export of `id`, read straight from storage
    pub async fn export_tree(&self, id: &str) -> Result<CategoryTreeNode, CategoryServiceError> {
        self.get_subtree(id, false).await
    }

    //
    // PRE-CHECKS
    //

    /// Normalized slug if it is free (ignoring `exclude_id`)
    pub async fn validate_slug(
        &self,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<String, CategoryServiceError> {
        self.check_explicit_slug(slug, exclude_id).await
    }

    /// Check that `id` could be moved under `parent_id` (`None` = root)
    pub async fn validate_parent(
        &self,
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<(), CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        if parent_id == id {
            return Err(CategoryServiceError::cyclic_move(id, parent_id));
        }
        let parent = self.fetch(parent_id, Missing::Parent).await?;
        if node.is_ancestor_of(&parent) {
            return Err(CategoryServiceError::cyclic_move(id, parent_id));
        }
        Ok(())
    }

    /// `Ok` if a non-forced delete of `id` would succeed
    pub async fn can_delete(&self, id: &str) -> Result<(), CategoryServiceError> {
        let node = self.fetch(id, Missing::Node).await?;
        if node.is_leaf() {
            Ok(())
        } else {
            Err(CategoryServiceError::has_children(
                id,
                node.descendant_count(),
            ))
        }
    }

    /// The slug `create_category` would derive from `title` right now.
    ///
    /// Not reserved: a concurrent create may take it first.
    pub async fn generate_unique_slug(
        &self,
        title: &str,
        exclude_id: Option<&str>,
    ) -> Result<String, CategoryServiceError> {
        self.unique_slug_for(title, exclude_id).await
    }

    //
    // INTEGRITY
    //

    /// Violations of the bound encoding across every tree (empty when healthy)
    pub async fn check_integrity(&self) -> Result<Vec<IntegrityViolation>, CategoryServiceError> {
        let nodes = self.store.list_all().await?;

        let mut trees: BTreeMap<i64, Vec<CategoryNode>> = BTreeMap::new();
        for node in nodes {
            trees.entry(node.tree_id).or_default().push(node);
        }

        let violations: Vec<IntegrityViolation> = trees
            .iter()
            .flat_map(|(tree_id, rows)| check_tree(*tree_id, rows))
            .collect();
        if !violations.is_empty() {
            tracing::warn!("Integrity check found {} violation(s)", violations.len());
        }
        Ok(violations)
    }

    //
    // CACHE MANAGEMENT
    //

    /// Populate forest, roots, statistics and every root subtree.
    /// Returns the number of views loaded.
    pub async fn warm_cache(&self) -> Result<usize, CategoryServiceError> {
        self.get_tree(true).await?;
        self.get_statistics(true).await?;
        let roots = self.get_roots(true).await?;
        for root in &roots {
            self.get_subtree(&root.id, true).await?;
        }

        let warmed = 3 + roots.len();
        tracing::info!("Warmed {} cache view(s)", warmed);
        Ok(warmed)
    }

    /// Drop every cached view. Returns the number of entries removed.
    pub async fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear().await;
        tracing::info!("Cleared {} cache entries", cleared);
        cleared
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
