//! Category Service - Structural Mutations
//!
//! `CategoryService` is the single entry point for reading and changing the
//! category forest. This file holds construction and the mutating operations;
//! read paths live in `category_reads.rs`.
//!
//! # Write Path
//!
//! Every structural mutation follows the same shape:
//!
//! 1. Validate the request against current rows (typed errors, nothing written)
//! 2. Lock the affected trees (ascending `tree_id`) and re-read the rows
//! 3. Load the trees into a [`TreeWorkspace`] and run the encoder primitives
//! 4. Commit the workspace difference as one [`ChangeSet`]
//! 5. Invalidate the cache, then release the locks
//! 6. Broadcast a [`CategoryEvent`]
//!
//! # Lock Order
//!
//! The catalog lock (slug resolution, tree id allocation) is always taken
//! before any tree lock. Tree locks are taken together, in ascending order.

use crate::config::TaxonomyConfig;
use crate::db::{CategoryEvent, CategoryStore, ChangeSet, MemoryStore};
use crate::models::{
    CategoryImport, CategoryNode, CategoryUpdate, CreateCategoryParams, DeleteResult,
    FieldUpdate, MovePosition, NodeStructure,
};
use crate::operations::{plan_rebuild, EncodingError, TreeGuards, TreeLocks, TreeWorkspace};
use crate::services::category_cache::{CategoryCache, MemoryCache, Region};
use crate::services::error::CategoryServiceError;
use crate::utils::{SlugGenerator, FALLBACK_SLUG};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Broadcast channel capacity for domain events
const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Which error a missing row maps to
#[derive(Debug, Clone, Copy)]
pub(crate) enum Missing {
    Node,
    Parent,
}

impl Missing {
    fn error(self, id: &str) -> CategoryServiceError {
        match self {
            Missing::Node => CategoryServiceError::not_found(id),
            Missing::Parent => CategoryServiceError::parent_not_found(id),
        }
    }
}

/// Outcome of [`CategoryService::create_bulk`]
#[derive(Debug, Default)]
pub struct BulkCreateResult {
    pub created: Vec<CategoryNode>,
    /// `(index into the request, error)` for every item that failed
    pub failures: Vec<(usize, CategoryServiceError)>,
}

/// Outcome of [`CategoryService::rebuild_tree`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub trees: usize,
    pub rows_rewritten: usize,
}

/// A move run on a workspace, not yet committed
struct StagedMove {
    workspace: TreeWorkspace,
    placed: NodeStructure,
    moved_rows: usize,
}

/// Category forest service
#[derive(Clone)]
pub struct CategoryService {
    pub(crate) store: Arc<dyn CategoryStore>,
    pub(crate) cache: Arc<CategoryCache>,
    locks: Arc<TreeLocks>,
    /// Serializes slug resolution and tree id allocation
    catalog: Arc<Mutex<()>>,
    pub(crate) slugs: SlugGenerator,
    pub(crate) config: TaxonomyConfig,
    event_tx: broadcast::Sender<CategoryEvent>,
}

impl std::fmt::Debug for CategoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryService")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl CategoryService {
    /// Create a service over an existing store and cache
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use taxonomy_core::config::TaxonomyConfig;
    /// # use taxonomy_core::db::MemoryStore;
    /// # use taxonomy_core::services::{CategoryCache, CategoryService};
    /// # use std::sync::Arc;
    /// let service = CategoryService::new(
    ///     Arc::new(MemoryStore::new()),
    ///     Arc::new(CategoryCache::default()),
    ///     TaxonomyConfig::default(),
    /// )
    /// .unwrap();
    /// ```
    pub fn new(
        store: Arc<dyn CategoryStore>,
        cache: Arc<CategoryCache>,
        config: TaxonomyConfig,
    ) -> Result<Self, CategoryServiceError> {
        config.validate().map_err(CategoryServiceError::validation)?;
        Ok(Self::assemble(store, cache, config))
    }

    /// In-memory store, in-memory cache, default configuration
    pub fn in_memory() -> Self {
        let config = TaxonomyConfig::default();
        let cache = CategoryCache::new(Arc::new(MemoryCache::new()), config.cache_ttl());
        Self::assemble(Arc::new(MemoryStore::new()), Arc::new(cache), config)
    }

    fn assemble(
        store: Arc<dyn CategoryStore>,
        cache: Arc<CategoryCache>,
        config: TaxonomyConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            cache,
            locks: Arc::new(TreeLocks::new()),
            catalog: Arc::new(Mutex::new(())),
            slugs: SlugGenerator::new(config.slug_max_length),
            config,
            event_tx,
        }
    }

    /// Build the store selected by `config` (libsql when a path is set)
    pub async fn from_config(config: TaxonomyConfig) -> Result<Self, CategoryServiceError> {
        config.validate().map_err(CategoryServiceError::validation)?;
        let cache = Arc::new(CategoryCache::new(
            Arc::new(MemoryCache::new()),
            config.cache_ttl(),
        ));

        let store: Arc<dyn CategoryStore> = match &config.database_path {
            #[cfg(feature = "turso")]
            Some(path) => Arc::new(
                crate::db::TursoStore::new(path.clone(), config.busy_timeout_ms).await?,
            ),
            #[cfg(not(feature = "turso"))]
            Some(path) => {
                return Err(CategoryServiceError::validation(format!(
                    "database path {} given but the turso feature is disabled",
                    path.display()
                )))
            }
            None => Arc::new(MemoryStore::new()),
        };

        Self::new(store, cache, config)
    }

    pub fn store(&self) -> &Arc<dyn CategoryStore> {
        &self.store
    }

    pub fn config(&self) -> &TaxonomyConfig {
        &self.config
    }

    /// Subscribe to domain events
    ///
    /// ```rust
    /// # use taxonomy_core::services::CategoryService;
    /// # #[tokio::main]
    /// # async fn main() {
    /// let service = CategoryService::in_memory();
    /// let mut rx = service.subscribe_to_events();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv().await {
    ///         println!("{}", event.event_type());
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<CategoryEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors: having no subscribers is normal.
    fn emit_event(&self, event: CategoryEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // SHARED HELPERS
    //

    pub(crate) async fn fetch(
        &self,
        id: &str,
        missing: Missing,
    ) -> Result<CategoryNode, CategoryServiceError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| missing.error(id))
    }

    /// Fetch rows, lock their trees and re-read them.
    ///
    /// A concurrent move can change a row's tree between the first read and
    /// the lock; in that case the locks are released and the whole step
    /// retried so the caller always holds the trees the rows are in.
    async fn lock_rows(
        &self,
        wanted: &[(&str, Missing)],
    ) -> Result<(Vec<CategoryNode>, TreeGuards), CategoryServiceError> {
        loop {
            let mut trees = Vec::with_capacity(wanted.len());
            for (id, missing) in wanted {
                trees.push(self.fetch(id, *missing).await?.tree_id);
            }

            let guards = self.locks.lock_trees(&trees).await;

            let mut rows = Vec::with_capacity(wanted.len());
            for (id, missing) in wanted {
                rows.push(self.fetch(id, *missing).await?);
            }

            if rows.iter().all(|row| guards.covers(row.tree_id)) {
                return Ok((rows, guards));
            }
            tracing::debug!("Tree changed while locking {:?}; retrying", trees);
        }
    }

    /// Load every tree in `tree_ids` into a fresh workspace
    async fn load_workspace(
        &self,
        tree_ids: &[i64],
    ) -> Result<TreeWorkspace, CategoryServiceError> {
        let mut workspace = TreeWorkspace::new();
        for tree_id in tree_ids {
            if workspace.is_tree_loaded(*tree_id) {
                continue;
            }
            let rows = self.store.get_by_tree_id(*tree_id).await?;
            workspace.load_tree(*tree_id, &rows)?;
        }
        Ok(workspace)
    }

    pub(crate) fn validate_title(&self, title: &str) -> Result<String, CategoryServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CategoryServiceError::validation("title must not be empty"));
        }
        let length = title.chars().count();
        if length > self.config.title_max_length {
            return Err(CategoryServiceError::validation(format!(
                "title is {} characters long, maximum is {}",
                length, self.config.title_max_length
            )));
        }
        Ok(title.to_string())
    }

    /// Normalize an explicit slug and require it to be free
    pub(crate) async fn check_explicit_slug(
        &self,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<String, CategoryServiceError> {
        let normalized = self.slugs.slugify(slug);
        if normalized.is_empty() {
            return Err(CategoryServiceError::validation(format!(
                "slug '{}' has no URL-safe characters",
                slug
            )));
        }
        if self.store.slug_exists(&normalized, exclude_id).await? {
            return Err(CategoryServiceError::slug_conflict(normalized));
        }
        Ok(normalized)
    }

    /// First free candidate among `base`, `base-1`, `base-2`, ...
    ///
    /// Callers that go on to write the slug must hold the catalog lock.
    pub(crate) async fn unique_slug_for(
        &self,
        title: &str,
        exclude_id: Option<&str>,
    ) -> Result<String, CategoryServiceError> {
        let mut base = self.slugs.slugify(title);
        if base.is_empty() {
            base = FALLBACK_SLUG.to_string();
        }

        for candidate in self.slugs.candidates(&base, self.config.slug_retry_budget) {
            if !self.store.slug_exists(&candidate, exclude_id).await? {
                return Ok(candidate);
            }
        }

        tracing::warn!(
            "Slug suffix budget of {} exhausted for '{}'",
            self.config.slug_retry_budget,
            base
        );
        Err(CategoryServiceError::slug_conflict(base))
    }

    fn map_anchor_error(err: EncodingError) -> CategoryServiceError {
        match err {
            EncodingError::InvalidAnchor {
                anchor_id,
                parent_id,
            } => CategoryServiceError::invalid_position(format!(
                "'{}' is not a child of '{}'",
                anchor_id, parent_id
            )),
            other => other.into(),
        }
    }

    //
    // CREATE
    //

    /// Create a category as the last child of `parent_id`, or as a new root.
    ///
    /// The row insert and the bound shift of every later row commit together.
    #[tracing::instrument(skip(self, params), fields(title = %params.title))]
    pub async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryNode, CategoryServiceError> {
        let title = self.validate_title(&params.title)?;

        let _catalog = self.catalog.lock().await;

        let slug = match params.slug.as_deref() {
            Some(explicit) => self.check_explicit_slug(explicit, None).await?,
            None => self.unique_slug_for(&title, None).await?,
        };

        let mut node = CategoryNode::new(title, slug);
        node.icon = params.icon;
        node.description = params.description.unwrap_or_default();
        node.image_ref = params.image_ref;

        let (placed, changes, footprint, _guards) = match params.parent_id.as_deref() {
            Some(parent_id) => {
                let (rows, guards) = self.lock_rows(&[(parent_id, Missing::Parent)]).await?;
                let parent = &rows[0];
                let mut workspace = self.load_workspace(&[parent.tree_id]).await?;
                let placed = workspace.insert_node(
                    &node.id,
                    Some(parent_id),
                    &MovePosition::LastChild,
                    None,
                )?;
                let region = Region::point(placed.tree_id, placed.left);
                (placed, workspace.changes(), Some((region, workspace)), guards)
            }
            None => {
                let tree_id = self.store.allocate_tree_id().await?;
                let guards = self.locks.lock_trees(&[tree_id]).await;
                let mut workspace = TreeWorkspace::new();
                let placed =
                    workspace.insert_node(&node.id, None, &MovePosition::LastChild, Some(tree_id))?;
                (placed, workspace.changes(), None, guards)
            }
        };

        node.apply_structure(&placed);
        let shifted = changes.updated.len();
        self.store
            .apply(ChangeSet {
                inserts: vec![node.clone()],
                structural_updates: changes.updated,
                ..Default::default()
            })
            .await?;

        match &footprint {
            Some((region, workspace)) => {
                self.cache
                    .invalidate_structural(std::slice::from_ref(region), |node_id| {
                        workspace.original(node_id).cloned()
                    })
                    .await
            }
            None => self.cache.invalidate_structural(&[], |_| None).await,
        };

        tracing::info!(
            "Created category {} ('{}') in tree {} at [{}, {}], {} row(s) shifted",
            node.id,
            node.slug,
            node.tree_id,
            node.left,
            node.right,
            shifted
        );
        self.emit_event(CategoryEvent::Created(node.clone()));
        Ok(node)
    }

    /// Create several categories, each independently.
    ///
    /// A failing item does not stop the others; it is reported with its index.
    pub async fn create_bulk(&self, items: Vec<CreateCategoryParams>) -> BulkCreateResult {
        let mut result = BulkCreateResult::default();
        for (index, params) in items.into_iter().enumerate() {
            match self.create_category(params).await {
                Ok(node) => result.created.push(node),
                Err(e) => {
                    tracing::warn!("Bulk create item {} failed: {}", index, e);
                    result.failures.push((index, e));
                }
            }
        }
        result
    }

    /// Create a nested structure depth-first under `parent_id` (or as a new
    /// root). Children keep their input order. Returns the created nodes in
    /// preorder.
    ///
    /// Each node commits on its own; on error the nodes created so far stay.
    pub async fn import_tree(
        &self,
        import: &CategoryImport,
        parent_id: Option<&str>,
    ) -> Result<Vec<CategoryNode>, CategoryServiceError> {
        let mut created = Vec::new();
        let mut stack: Vec<(&CategoryImport, Option<String>)> =
            vec![(import, parent_id.map(str::to_string))];

        while let Some((item, parent)) = stack.pop() {
            let node = self
                .create_category(CreateCategoryParams {
                    title: item.title.clone(),
                    slug: item.slug.clone(),
                    parent_id: parent,
                    icon: item.icon.clone(),
                    description: item.description.clone(),
                    image_ref: None,
                })
                .await?;

            for child in item.children.iter().rev() {
                stack.push((child, Some(node.id.clone())));
            }
            created.push(node);
        }

        tracing::info!("Imported {} categories", created.len());
        Ok(created)
    }

    //
    // UPDATE
    //

    /// Update display fields; a `parent_id` change also moves the node to
    /// the end of the new parent's children.
    ///
    /// Validation, field rewrite and move run under one set of locks and
    /// commit as a single change set.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_category(
        &self,
        id: &str,
        update: CategoryUpdate,
    ) -> Result<CategoryNode, CategoryServiceError> {
        let title = update
            .title
            .as_deref()
            .map(|t| self.validate_title(t))
            .transpose()?;
        let target = update.parent_id.as_ref().map(|p| p.as_deref());
        if target == Some(Some(id)) {
            return Err(CategoryServiceError::cyclic_move(id, id));
        }

        let _catalog = self.catalog.lock().await;

        let mut wanted = vec![(id, Missing::Node)];
        if let Some(Some(parent_id)) = target {
            wanted.push((parent_id, Missing::Parent));
        }
        let (rows, guards) = self.lock_rows(&wanted).await?;
        let node = &rows[0];
        let parent = rows.get(1);

        let mut updated = node.clone();
        let fields = if update.has_field_changes() {
            self.apply_field_changes(&mut updated, &update, title).await?;
            Some(FieldUpdate::from_node(&updated))
        } else {
            None
        };

        let staged = match target {
            Some(target) if target != node.parent_id.as_deref() => {
                self.stage_move(node, parent, &MovePosition::LastChild).await?
            }
            _ => None,
        };

        match staged {
            Some(staged) => {
                let placed = self.commit_move(node, parent, staged, fields.clone()).await?;
                self.release_trees(guards, node.is_root());
                updated.apply_structure(&placed);

                if fields.is_some() {
                    self.emit_event(CategoryEvent::Updated(updated.clone()));
                }
                self.emit_event(CategoryEvent::Moved {
                    node: updated.clone(),
                    from_parent_id: node.parent_id.clone(),
                    to_parent_id: updated.parent_id.clone(),
                });
            }
            None => {
                let Some(fields) = fields else {
                    return Ok(updated);
                };
                self.store.update_fields(fields).await?;

                let tree: HashMap<String, NodeStructure> = self
                    .store
                    .get_by_tree_id(updated.tree_id)
                    .await?
                    .into_iter()
                    .map(|row| (row.id.clone(), row.structure()))
                    .collect();
                self.cache
                    .invalidate_fields(&updated.structure(), |node_id| tree.get(node_id).cloned())
                    .await;

                tracing::info!("Updated fields of category {} ('{}')", updated.id, updated.slug);
                self.emit_event(CategoryEvent::Updated(updated.clone()));
            }
        }
        Ok(updated)
    }

    /// Apply the display-field part of `update` to `node`.
    ///
    /// The caller holds the catalog lock, so a checked slug stays free.
    async fn apply_field_changes(
        &self,
        node: &mut CategoryNode,
        update: &CategoryUpdate,
        title: Option<String>,
    ) -> Result<(), CategoryServiceError> {
        if let Some(slug) = update.slug.as_deref() {
            let normalized = self.slugs.slugify(slug);
            if normalized != node.slug {
                node.slug = self.check_explicit_slug(slug, Some(node.id.as_str())).await?;
            }
        }
        if let Some(title) = title {
            node.title = title;
        }
        if let Some(icon) = &update.icon {
            node.icon = icon.clone();
        }
        if let Some(description) = &update.description {
            node.description = description.clone();
        }
        if let Some(image_ref) = &update.image_ref {
            node.image_ref = image_ref.clone();
        }
        node.updated_at = Utc::now();
        Ok(())
    }

    //
    // MOVE
    //

    /// Reattach `id` and its subtree under `new_parent_id` at `position`,
    /// or make it a new root when `new_parent_id` is `None`.
    ///
    /// Moving across trees is allowed; the subtree takes the destination's
    /// `tree_id`. A move that leaves every bound unchanged commits nothing.
    #[tracing::instrument(skip(self))]
    pub async fn move_category(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        position: MovePosition,
    ) -> Result<CategoryNode, CategoryServiceError> {
        if new_parent_id == Some(id) {
            return Err(CategoryServiceError::cyclic_move(id, id));
        }
        if position.anchor() == Some(id) {
            return Err(CategoryServiceError::invalid_position(
                "a category cannot be positioned relative to itself",
            ));
        }
        if new_parent_id.is_none() && position.anchor().is_some() {
            return Err(CategoryServiceError::invalid_position(
                "sibling positions need a parent",
            ));
        }

        // New trees are only born under the catalog lock
        let _catalog = match new_parent_id {
            Some(_) => None,
            None => Some(self.catalog.lock().await),
        };

        let mut wanted = vec![(id, Missing::Node)];
        if let Some(parent_id) = new_parent_id {
            wanted.push((parent_id, Missing::Parent));
        }
        let (rows, guards) = self.lock_rows(&wanted).await?;
        let node = &rows[0];
        let parent = rows.get(1);

        let Some(staged) = self.stage_move(node, parent, &position).await? else {
            tracing::debug!("Move of {} leaves the encoding unchanged", id);
            return Ok(node.clone());
        };
        let placed = self.commit_move(node, parent, staged, None).await?;
        self.release_trees(guards, node.is_root());

        let mut moved = node.clone();
        moved.apply_structure(&placed);
        self.emit_event(CategoryEvent::Moved {
            node: moved.clone(),
            from_parent_id: node.parent_id.clone(),
            to_parent_id: moved.parent_id.clone(),
        });
        Ok(moved)
    }

    /// Run the move of `node` on a workspace without writing anything.
    ///
    /// Both trees must be locked. Returns `None` when no bound would change.
    async fn stage_move(
        &self,
        node: &CategoryNode,
        parent: Option<&CategoryNode>,
        position: &MovePosition,
    ) -> Result<Option<StagedMove>, CategoryServiceError> {
        if let Some(parent) = parent {
            if node.is_ancestor_of(parent) {
                return Err(CategoryServiceError::cyclic_move(&node.id, &parent.id));
            }
        }
        if parent.is_none() && node.is_root() {
            return Ok(None);
        }

        let new_tree_id = match parent {
            Some(_) => None,
            None => Some(self.store.allocate_tree_id().await?),
        };

        let mut trees = vec![node.tree_id];
        trees.extend(parent.map(|p| p.tree_id));
        let mut workspace = self.load_workspace(&trees).await?;

        let subtree = workspace.detach_subtree(&node.id)?;
        let moved_rows = subtree.len();
        let placed = workspace
            .reattach_subtree(subtree, parent.map(|p| p.id.as_str()), position, new_tree_id)
            .map_err(Self::map_anchor_error)?;

        if workspace.changes().is_empty() {
            return Ok(None);
        }
        Ok(Some(StagedMove {
            workspace,
            placed,
            moved_rows,
        }))
    }

    /// Commit a staged move, plus an optional field rewrite of the moved
    /// node, as one change set and invalidate the touched regions.
    async fn commit_move(
        &self,
        node: &CategoryNode,
        parent: Option<&CategoryNode>,
        staged: StagedMove,
        fields: Option<FieldUpdate>,
    ) -> Result<NodeStructure, CategoryServiceError> {
        let changes = staged.workspace.changes();
        let rewritten = changes.updated.len();
        self.store
            .apply(ChangeSet {
                structural_updates: changes.updated,
                field_updates: fields.into_iter().collect(),
                ..Default::default()
            })
            .await?;

        let mut regions = vec![Region::of(&node.structure())];
        regions.extend(parent.map(|p| Region::of(&p.structure())));
        self.cache
            .invalidate_structural(&regions, |node_id| staged.workspace.original(node_id).cloned())
            .await;

        tracing::info!(
            "Moved category {} ({} row(s)) from tree {} to tree {} at [{}, {}], {} row(s) rewritten",
            node.id,
            staged.moved_rows,
            node.tree_id,
            staged.placed.tree_id,
            staged.placed.left,
            staged.placed.right,
            rewritten
        );
        Ok(staged.placed)
    }

    /// Release tree locks; prune the registry when a tree was emptied.
    fn release_trees(&self, guards: TreeGuards, tree_emptied: bool) {
        drop(guards);
        if tree_emptied {
            let pruned = self.locks.prune();
            tracing::debug!("Pruned {} idle tree lock(s)", pruned);
        }
    }

    //
    // DELETE
    //

    /// Delete a leaf, or with `force` a whole subtree.
    ///
    /// Every row after the removed interval shrinks by its width in the same
    /// commit.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(
        &self,
        id: &str,
        force: bool,
    ) -> Result<DeleteResult, CategoryServiceError> {
        let (rows, guards) = self.lock_rows(&[(id, Missing::Node)]).await?;
        let node = &rows[0];

        if !node.is_leaf() && !force {
            return Err(CategoryServiceError::has_children(
                id,
                node.descendant_count(),
            ));
        }

        let mut workspace = self.load_workspace(&[node.tree_id]).await?;
        let subtree = workspace.detach_subtree(id)?;
        let deleted_ids = subtree.ids();
        drop(subtree);

        let changes = workspace.changes();
        let shifted = changes.updated.len();
        self.store
            .apply(ChangeSet {
                structural_updates: changes.updated,
                deletes: changes.removed,
                ..Default::default()
            })
            .await?;

        self.cache
            .invalidate_structural(&[Region::of(&node.structure())], |node_id| {
                workspace.original(node_id).cloned()
            })
            .await;

        self.release_trees(guards, node.is_root());

        tracing::info!(
            "Deleted category {} and {} descendant(s) from tree {}, {} row(s) shifted",
            id,
            deleted_ids.len() - 1,
            node.tree_id,
            shifted
        );
        self.emit_event(CategoryEvent::Deleted {
            id: id.to_string(),
            deleted_ids: deleted_ids.clone(),
        });
        Ok(DeleteResult { deleted_ids })
    }

    //
    // REPAIR
    //

    /// Recompute every tree's bounds and levels from `parent_id` links.
    ///
    /// Children keep their current order (by `left`, then title). Only rows
    /// whose encoding changed are written; the cache is cleared afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_tree(&self) -> Result<RebuildReport, CategoryServiceError> {
        let _catalog = self.catalog.lock().await;

        // No tree can be created while the catalog lock is held, so locking
        // the current tree ids covers every row.
        let tree_ids: Vec<i64> = self
            .store
            .list_all()
            .await?
            .iter()
            .map(|n| n.tree_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let _guards = self.locks.lock_trees(&tree_ids).await;

        let nodes = self.store.list_all().await?;
        let current: HashMap<&str, NodeStructure> =
            nodes.iter().map(|n| (n.id.as_str(), n.structure())).collect();

        let mut plans = plan_rebuild(&nodes)?;
        for plan in plans.iter_mut().filter(|p| p.tree_id.is_none()) {
            let tree_id = self.store.allocate_tree_id().await?;
            tracing::warn!(
                "Root {} shared a tree id with another root; moved to tree {}",
                plan.root_id,
                tree_id
            );
            plan.assign_tree_id(tree_id);
        }

        let updates: Vec<_> = plans
            .iter()
            .flat_map(|plan| plan.rows.iter())
            .filter(|row| current.get(row.id.as_str()) != Some(&row.structure))
            .cloned()
            .collect();
        let report = RebuildReport {
            trees: plans.len(),
            rows_rewritten: updates.len(),
        };

        if !updates.is_empty() {
            tracing::warn!("Rebuild rewrote {} row(s)", updates.len());
            self.store.update_many(updates).await?;
        }
        self.cache.clear().await;

        tracing::info!(
            "Rebuilt {} tree(s), {} row(s) rewritten",
            report.trees,
            report.rows_rewritten
        );
        self.emit_event(CategoryEvent::Rebuilt {
            tree_count: report.trees,
        });
        Ok(report)
    }
}

// Comprehensive tests in separate modules
#[cfg(test)]
#[path = "category_service_mutation_test.rs"]
mod category_service_mutation_test;

#[cfg(test)]
#[path = "category_service_read_test.rs"]
mod category_service_read_test;
