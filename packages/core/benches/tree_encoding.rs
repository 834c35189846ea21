//! Benchmarks for the category tree engine
//!
//! Run with: `cargo bench -p taxonomy-core`
//!
//! These benchmarks measure the write and read paths that scale with tree size:
//! - Appending a child (gap open over the right-hand side of the tree)
//! - Moving a subtree between trees (gap close plus gap open)
//! - Breadcrumb reads with and without the cache
//! - Importing a nested structure into a libsql file

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use taxonomy_core::models::{CategoryImport, CategoryNode, CreateCategoryParams, MovePosition};
use taxonomy_core::services::CategoryService;
use taxonomy_core::TaxonomyConfig;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// A root with `width` children, each holding `depth` nested levels
async fn seed_tree(
    service: &CategoryService,
    title: &str,
    width: usize,
    depth: usize,
) -> CategoryNode {
    let root = service
        .create_category(CreateCategoryParams::new(title))
        .await
        .unwrap();
    for branch in 0..width {
        let mut parent = root.id.clone();
        for level in 0..depth {
            let node = service
                .create_category(
                    CreateCategoryParams::new(format!("{} {}.{}", title, branch, level))
                        .with_parent(parent),
                )
                .await
                .unwrap();
            parent = node.id;
        }
    }
    service.get_category(&root.id).await.unwrap()
}

fn generate_import(breadth: usize, depth: usize) -> CategoryImport {
    fn level(prefix: &str, breadth: usize, depth: usize) -> Vec<CategoryImport> {
        if depth == 0 {
            return Vec::new();
        }
        (0..breadth)
            .map(|i| {
                let title = format!("{}.{}", prefix, i);
                CategoryImport {
                    children: level(&title, breadth, depth - 1),
                    title,
                    ..Default::default()
                }
            })
            .collect()
    }

    CategoryImport {
        title: "Catalog".to_string(),
        children: level("C", breadth, depth),
        ..Default::default()
    }
}

/// Benchmark appending leaves under a populated tree
fn bench_append_child(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("append_child_500_rows", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let service = CategoryService::in_memory();
                let root = seed_tree(&service, "Bench", 50, 10).await;
                let first_branch = service.get_children(&root.id).await.unwrap()[0].id.clone();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    black_box(
                        service
                            .create_category(
                                CreateCategoryParams::new(format!("Leaf {}", i))
                                    .with_parent(first_branch.clone()),
                            )
                            .await
                            .unwrap(),
                    );
                }
                start.elapsed()
            })
        });
    });
}

/// Benchmark moving a 10-row subtree back and forth between two trees
fn bench_cross_tree_move(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("cross_tree_move", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let service = CategoryService::in_memory();
                let left = seed_tree(&service, "Left", 20, 5).await;
                let right = seed_tree(&service, "Right", 20, 5).await;
                let subtree = seed_tree(&service, "Moving", 3, 3).await;

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let target = if i % 2 == 0 { &left.id } else { &right.id };
                    black_box(
                        service
                            .move_category(&subtree.id, Some(target), MovePosition::FirstChild)
                            .await
                            .unwrap(),
                    );
                }
                start.elapsed()
            })
        });
    });
}

/// Benchmark breadcrumb resolution for a deep node
fn bench_breadcrumb(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (service, deepest) = rt.block_on(async {
        let service = CategoryService::in_memory();
        let root = seed_tree(&service, "Deep", 10, 20).await;
        let deepest = service
            .get_descendants(&root.id, false)
            .await
            .unwrap()
            .into_iter()
            .max_by_key(|n| n.level)
            .unwrap();
        (service, deepest.id)
    });

    let mut group = c.benchmark_group("breadcrumb");
    group.bench_function("uncached", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(service.get_breadcrumb(&deepest, false).await.unwrap());
            })
        })
    });
    group.bench_function("cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(service.get_breadcrumb(&deepest, true).await.unwrap());
            })
        })
    });
    group.finish();
}

/// Benchmark importing ~150 nested categories into a libsql file
fn bench_import_libsql(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let import = generate_import(5, 3);

    let mut group = c.benchmark_group("import");
    group.sample_size(10); // Fewer samples for expensive operations

    group.bench_function("libsql_156_nodes", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let mut total = std::time::Duration::ZERO;

                for _ in 0..iters {
                    let temp_dir = TempDir::new().unwrap();
                    let service = CategoryService::from_config(TaxonomyConfig {
                        database_path: Some(temp_dir.path().join("bench.db")),
                        ..Default::default()
                    })
                    .await
                    .unwrap();

                    let start = std::time::Instant::now();
                    let created = service.import_tree(&import, None).await.unwrap();
                    total += start.elapsed();

                    black_box(created);
                }

                total
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append_child,
    bench_cross_tree_move,
    bench_breadcrumb,
    bench_import_libsql
);
criterion_main!(benches);
