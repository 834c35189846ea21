//! Taxonomy CLI - manage a category forest stored in a libsql file
//!
//! Every command opens the database, runs one service operation and prints
//! the result as JSON on stdout. Logs go to stderr, filtered by `RUST_LOG`.
//!
//! The view cache lives inside the process, so it starts empty on every run.
//! `warm-cache` and `clear-cache` are diagnostics over that per-run cache.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use taxonomy_core::models::{CategoryImport, CategoryUpdate, CreateCategoryParams, MovePosition};
use taxonomy_core::services::{CategoryService, DEFAULT_SEARCH_LIMIT};
use taxonomy_core::TaxonomyConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taxonomy")]
#[command(about = "Hierarchical category store", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file
    #[arg(long, env = "TAXONOMY_DB_PATH")]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a category (last child of --parent, or a new root)
    Create {
        title: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Change display fields of a category
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Move a category and its subtree
    Move {
        id: String,
        #[command(flatten)]
        target: MoveTarget,
    },

    /// Delete a category
    Delete {
        id: String,
        /// Delete the whole subtree
        #[arg(long)]
        force: bool,
    },

    /// Print the forest, or one subtree with --id
    Tree {
        #[arg(long)]
        id: Option<String>,
    },

    /// Print the root-to-node chain
    Breadcrumb {
        id: String,
        /// Print "A > B > C" instead of JSON
        #[arg(long)]
        path: bool,
    },

    /// Search titles, slugs and descriptions
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Forest statistics, or per-category statistics with --id
    Stats {
        #[arg(long)]
        id: Option<String>,
    },

    /// Report encoding violations (non-zero exit if any)
    Check,

    /// Recompute every bound from parent links
    Rebuild,

    /// Diagnostic: build every cached view and report counts and build time
    WarmCache,

    /// Diagnostic: warm the per-run cache, then drop it and report the count
    ClearCache,

    /// Import a nested JSON structure
    Import {
        file: PathBuf,
        #[arg(long)]
        parent: Option<String>,
    },

    /// Export a subtree as nested JSON
    Export { id: String },
}

#[derive(Args)]
struct MoveTarget {
    /// New parent; omit to make the category a root
    #[arg(long)]
    parent: Option<String>,

    /// Place before the existing children
    #[arg(long, conflicts_with_all = ["before", "after"])]
    first: bool,

    /// Place immediately before this sibling
    #[arg(long, conflicts_with = "after")]
    before: Option<String>,

    /// Place immediately after this sibling
    #[arg(long)]
    after: Option<String>,
}

impl MoveTarget {
    fn position(&self) -> MovePosition {
        if self.first {
            MovePosition::FirstChild
        } else if let Some(id) = &self.before {
            MovePosition::Before(id.clone())
        } else if let Some(id) = &self.after {
            MovePosition::After(id.clone())
        } else {
            MovePosition::LastChild
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_service(db: Option<PathBuf>) -> Result<CategoryService> {
    let mut config = TaxonomyConfig::from_env().map_err(anyhow::Error::msg)?;
    if db.is_some() {
        config.database_path = db;
    }
    let Some(path) = config.database_path.clone() else {
        bail!("no database given: pass --db or set TAXONOMY_DB_PATH");
    };

    tracing::debug!("Opening category store at {}", path.display());
    CategoryService::from_config(config)
        .await
        .with_context(|| format!("failed to open {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let service = open_service(cli.db).await?;

    match cli.command {
        Commands::Create {
            title,
            parent,
            slug,
            icon,
            description,
        } => {
            let node = service
                .create_category(CreateCategoryParams {
                    title,
                    slug,
                    parent_id: parent,
                    icon,
                    description,
                    image_ref: None,
                })
                .await?;
            print_json(&node)
        }
        Commands::Update {
            id,
            title,
            slug,
            icon,
            description,
        } => {
            let update = CategoryUpdate {
                title,
                slug,
                icon: icon.map(Some),
                description,
                ..Default::default()
            };
            if !update.has_field_changes() {
                bail!("nothing to update");
            }
            print_json(&service.update_category(&id, update).await?)
        }
        Commands::Move { id, target } => {
            let node = service
                .move_category(&id, target.parent.as_deref(), target.position())
                .await?;
            print_json(&node)
        }
        Commands::Delete { id, force } => {
            print_json(&service.delete_category(&id, force).await?)
        }
        Commands::Tree { id: Some(id) } => print_json(&service.get_subtree(&id, false).await?),
        Commands::Tree { id: None } => print_json(&service.get_tree(false).await?),
        Commands::Breadcrumb { id, path: true } => {
            println!("{}", service.category_path(&id).await?);
            Ok(())
        }
        Commands::Breadcrumb { id, path: false } => {
            print_json(&service.get_breadcrumb(&id, false).await?)
        }
        Commands::Search { query, limit } => {
            print_json(&service.search_categories(&query, limit).await?)
        }
        Commands::Stats { id: Some(id) } => print_json(&service.category_stats(&id).await?),
        Commands::Stats { id: None } => print_json(&service.get_statistics(false).await?),
        Commands::Check => {
            let violations = service.check_integrity().await?;
            print_json(&violations)?;
            if !violations.is_empty() {
                bail!("{} integrity violation(s) found", violations.len());
            }
            Ok(())
        }
        Commands::Rebuild => print_json(&service.rebuild_tree().await?),
        Commands::WarmCache => {
            let started = Instant::now();
            let views = service.warm_cache().await?;
            let elapsed_ms = started.elapsed().as_millis();
            tracing::info!("Built {} view(s) in {} ms", views, elapsed_ms);
            print_json(&serde_json::json!({
                "views": views,
                "elapsedMs": elapsed_ms,
                "cache": service.cache_stats(),
            }))
        }
        Commands::ClearCache => {
            let warmed = service.warm_cache().await?;
            let cleared = service.clear_cache().await;
            print_json(&serde_json::json!({ "warmed": warmed, "cleared": cleared }))
        }
        Commands::Import { file, parent } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let import: CategoryImport = serde_json::from_str(&raw)
                .with_context(|| format!("invalid import file {}", file.display()))?;
            let created = service.import_tree(&import, parent.as_deref()).await?;
            tracing::info!("Imported {} categories from {}", created.len(), file.display());
            print_json(&created)
        }
        Commands::Export { id } => print_json(&service.export_tree(&id).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cache_commands_are_labelled_diagnostics() {
        let cli = Cli::command();
        for name in ["warm-cache", "clear-cache"] {
            let about = cli
                .find_subcommand(name)
                .and_then(|sub| sub.get_about())
                .map(|about| about.to_string())
                .unwrap_or_default();
            assert!(about.starts_with("Diagnostic"), "{}: {}", name, about);
        }
    }

    #[test]
    fn test_move_target_defaults_to_last_child() {
        let cli = Cli::parse_from(["taxonomy", "--db", "t.db", "move", "a", "--parent", "b"]);
        match cli.command {
            Commands::Move { target, .. } => {
                assert_eq!(target.parent.as_deref(), Some("b"));
                assert_eq!(target.position(), MovePosition::LastChild);
            }
            _ => panic!("expected a move command"),
        }
    }
}
