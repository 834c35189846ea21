//! TursoStore - CategoryStore Implementation for Turso/libsql Backend
//!
//! Categories live in a single `categories` table. The preorder bounds are
//! stored as `lft`/`rgt` (both are SQL keywords otherwise) and indexed together
//! with `tree_id`, which turns every ancestor/descendant question into one
//! range scan.
//!
//! Tree ids come from the single-row `tree_sequence` table so an id is never
//! handed out twice, even after the tree that used it was deleted.
//!
//! # Connections
//!
//! Every call opens a fresh connection with the busy timeout applied. libsql
//! connections must not be shared across `.await` points on different tokio
//! worker threads, so nothing is cached here apart from the `Database` handle.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taxonomy_core::db::{CategoryStore, TursoStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = TursoStore::new(PathBuf::from("./data/taxonomy.db"), 5000).await?;
//!     println!("{} categories", store.count().await?);
//!     Ok(())
//! }
//! ```

use crate::db::{CategoryStore, ChangeSet, DatabaseError};
use crate::models::CategoryNode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SELECT_COLUMNS: &str = "SELECT id, title, slug, parent_id, tree_id, level, lft, rgt, \
     icon, description, image_ref, created_at, updated_at FROM categories";

/// libsql-backed category store
#[derive(Clone)]
pub struct TursoStore {
    db: Arc<Database>,
    db_path: PathBuf,
    busy_timeout_ms: u64,
}

impl std::fmt::Debug for TursoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoStore")
            .field("db_path", &self.db_path)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional_text(value: Option<&str>) -> Value {
    match value {
        Some(v) => text(v),
        None => Value::Null,
    }
}

fn parse_timestamp(id: &str, column: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::invalid_row(id, format!("{}: {}", column, e)))
}

fn row_to_node(row: &libsql::Row) -> Result<CategoryNode, DatabaseError> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(CategoryNode {
        title: row.get(1)?,
        slug: row.get(2)?,
        parent_id: row.get(3)?,
        tree_id: row.get(4)?,
        level: row.get(5)?,
        left: row.get(6)?,
        right: row.get(7)?,
        icon: row.get(8)?,
        description: row.get::<Option<String>>(9)?.unwrap_or_default(),
        image_ref: row.get(10)?,
        created_at: parse_timestamp(&id, "created_at", &created_at)?,
        updated_at: parse_timestamp(&id, "updated_at", &updated_at)?,
        id,
    })
}

impl TursoStore {
    /// Open (or create) the database file and make sure the schema exists
    pub async fn new(db_path: PathBuf, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };
        store.initialize_schema().await?;

        tracing::debug!("Opened category store at {}", store.db_path.display());
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// PRAGMA statements return rows, so they go through query() instead of execute()
    async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self.db.connect().map_err(DatabaseError::LibsqlError)?;
        Self::execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        Ok(conn)
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        Self::execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                parent_id TEXT,
                tree_id INTEGER NOT NULL,
                level INTEGER NOT NULL,
                lft INTEGER NOT NULL,
                rgt INTEGER NOT NULL,
                icon TEXT,
                description TEXT NOT NULL DEFAULT '',
                image_ref TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create categories table: {}", e))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_categories_tree_bounds ON categories(tree_id, lft, rgt)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create bounds index: {}", e))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create parent index: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tree_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_value INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create tree_sequence: {}", e))
        })?;

        // Seed past any tree id already present so older files keep working
        conn.execute(
            "INSERT OR IGNORE INTO tree_sequence (id, next_value)
             SELECT 1, COALESCE(MAX(tree_id), 0) + 1 FROM categories",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to seed tree_sequence: {}", e))
        })?;

        Ok(())
    }

    async fn query_nodes(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn.query(sql, params).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Query failed '{}': {}", sql, e))
        })?;

        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn query_one(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<CategoryNode>, DatabaseError> {
        Ok(self.query_nodes(sql, params).await?.into_iter().next())
    }

    /// Run every statement of the change set on an open transaction
    async fn write_changes(conn: &Connection, changes: ChangeSet) -> Result<(), DatabaseError> {
        for id in &changes.deletes {
            let affected = conn
                .execute("DELETE FROM categories WHERE id = ?", vec![text(id)])
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to delete {}: {}", id, e))
                })?;
            if affected != 1 {
                return Err(DatabaseError::row_not_found(id.clone()));
            }
        }

        for update in &changes.structural_updates {
            let s = &update.structure;
            let affected = conn
                .execute(
                    "UPDATE categories SET parent_id = ?, tree_id = ?, level = ?, lft = ?, rgt = ?
                     WHERE id = ?",
                    vec![
                        optional_text(s.parent_id.as_deref()),
                        Value::Integer(s.tree_id),
                        Value::Integer(s.level),
                        Value::Integer(s.left),
                        Value::Integer(s.right),
                        text(&update.id),
                    ],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to update bounds of {}: {}",
                        update.id, e
                    ))
                })?;
            if affected != 1 {
                return Err(DatabaseError::row_not_found(update.id.clone()));
            }
        }

        for update in &changes.field_updates {
            let affected = conn
                .execute(
                    "UPDATE categories SET title = ?, slug = ?, icon = ?, description = ?,
                     image_ref = ?, updated_at = ? WHERE id = ?",
                    vec![
                        text(&update.title),
                        text(&update.slug),
                        optional_text(update.icon.as_deref()),
                        text(&update.description),
                        optional_text(update.image_ref.as_deref()),
                        text(&update.updated_at.to_rfc3339()),
                        text(&update.id),
                    ],
                )
                .await
                .map_err(|e| map_write_error(&update.id, e))?;
            if affected != 1 {
                return Err(DatabaseError::row_not_found(update.id.clone()));
            }
        }

        for node in &changes.inserts {
            conn.execute(
                "INSERT INTO categories (id, title, slug, parent_id, tree_id, level, lft, rgt,
                 icon, description, image_ref, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    text(&node.id),
                    text(&node.title),
                    text(&node.slug),
                    optional_text(node.parent_id.as_deref()),
                    Value::Integer(node.tree_id),
                    Value::Integer(node.level),
                    Value::Integer(node.left),
                    Value::Integer(node.right),
                    optional_text(node.icon.as_deref()),
                    text(&node.description),
                    optional_text(node.image_ref.as_deref()),
                    text(&node.created_at.to_rfc3339()),
                    text(&node.updated_at.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| map_write_error(&node.id, e))?;
        }

        Ok(())
    }
}

fn map_write_error(id: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::constraint_violation(format!("{}: {}", id, message))
    } else {
        DatabaseError::sql_execution(format!("Failed to write {}: {}", id, message))
    }
}

#[async_trait]
impl CategoryStore for TursoStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<CategoryNode>, DatabaseError> {
        self.query_one(&format!("{} WHERE id = ?", SELECT_COLUMNS), vec![text(id)])
            .await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<CategoryNode>, DatabaseError> {
        self.query_one(&format!("{} WHERE slug = ?", SELECT_COLUMNS), vec![text(slug)])
            .await
    }

    async fn slug_exists(
        &self,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM categories WHERE slug = ? AND (? IS NULL OR id != ?)",
                vec![text(slug), optional_text(exclude_id), optional_text(exclude_id)],
            )
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count > 0)
    }

    async fn get_by_tree_id(&self, tree_id: i64) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(
            &format!("{} WHERE tree_id = ? ORDER BY lft", SELECT_COLUMNS),
            vec![Value::Integer(tree_id)],
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(&format!("{} ORDER BY tree_id, lft", SELECT_COLUMNS), Vec::new())
            .await
    }

    async fn get_roots(&self) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(
            &format!("{} WHERE parent_id IS NULL ORDER BY tree_id, lft", SELECT_COLUMNS),
            Vec::new(),
        )
        .await
    }

    async fn get_children(&self, parent_id: &str) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(
            &format!("{} WHERE parent_id = ? ORDER BY tree_id, lft", SELECT_COLUMNS),
            vec![text(parent_id)],
        )
        .await
    }

    async fn get_ancestors(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(
            &format!(
                "{} WHERE tree_id = ? AND lft < ? AND rgt > ? ORDER BY lft",
                SELECT_COLUMNS
            ),
            vec![
                Value::Integer(tree_id),
                Value::Integer(left),
                Value::Integer(right),
            ],
        )
        .await
    }

    async fn get_descendants(
        &self,
        tree_id: i64,
        left: i64,
        right: i64,
    ) -> Result<Vec<CategoryNode>, DatabaseError> {
        self.query_nodes(
            &format!(
                "{} WHERE tree_id = ? AND lft > ? AND rgt < ? ORDER BY lft",
                SELECT_COLUMNS
            ),
            vec![
                Value::Integer(tree_id),
                Value::Integer(left),
                Value::Integer(right),
            ],
        )
        .await
    }

    /// Matched in Rust: SQLite `LIKE` folds ASCII case only.
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<CategoryNode>, DatabaseError> {
        let needle = term.to_lowercase();
        let sql = format!("{} ORDER BY level, title", SELECT_COLUMNS);
        let conn = self.connect().await?;
        let mut rows = conn.query(&sql, ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Query failed '{}': {}", sql, e))
        })?;

        let mut hits = Vec::new();
        while hits.len() < limit {
            let Some(row) = rows.next().await? else {
                break;
            };
            let node = row_to_node(&row)?;
            if node.matches_search(&needle) {
                hits.push(node);
            }
        }
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM categories", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count as usize)
    }

    async fn allocate_tree_id(&self) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;

        let allocated = async {
            let mut rows = conn
                .query("SELECT next_value FROM tree_sequence WHERE id = 1", ())
                .await?;
            let next: i64 = match rows.next().await? {
                Some(row) => row.get(0)?,
                None => return Err(DatabaseError::initialization_failed("tree_sequence is empty")),
            };
            conn.execute(
                "UPDATE tree_sequence SET next_value = ? WHERE id = 1",
                vec![Value::Integer(next + 1)],
            )
            .await?;
            Ok(next)
        }
        .await;

        match allocated {
            Ok(tree_id) => {
                conn.execute("COMMIT", ()).await.map_err(|e| {
                    DatabaseError::transaction_failed(format!("Failed to commit: {}", e))
                })?;
                Ok(tree_id)
            }
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                Err(e)
            }
        }
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }

        let statements = changes.len();
        let conn = self.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;

        if let Err(e) = Self::write_changes(&conn, changes).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            tracing::warn!("Rolled back change set: {}", e);
            return Err(e);
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::transaction_failed(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        tracing::debug!("Committed change set with {} row writes", statements);
        Ok(())
    }
}
