//! Forest-wide aggregate metrics
//!
//! Everything is derived from the bound encoding of each row, so one pass over
//! the forest is enough: no parent/child joins.

use crate::models::{CategoryNode, ForestStatistics};
use std::collections::BTreeMap;

/// Aggregate statistics over every node of the forest.
///
/// `avg_children` is the average branching factor among nodes that have at
/// least one child: every non-root node is somebody's child, so the number of
/// parent/child edges is `total - roots`.
///
/// ```rust
/// use taxonomy_core::services::forest_statistics;
///
/// let stats = forest_statistics(&[]);
/// assert_eq!(stats.max_depth, 0);
/// assert_eq!(stats.avg_children, 0.0);
/// ```
pub fn forest_statistics(nodes: &[CategoryNode]) -> ForestStatistics {
    let mut levels: BTreeMap<i64, usize> = BTreeMap::new();
    let mut roots = 0;
    let mut leaves = 0;
    let mut with_children = 0;

    for node in nodes {
        *levels.entry(node.level).or_insert(0) += 1;
        if node.is_root() {
            roots += 1;
        }
        if node.is_leaf() {
            leaves += 1;
        } else {
            with_children += 1;
        }
    }

    let total = nodes.len();
    let max_depth = levels
        .keys()
        .next_back()
        .map(|deepest| (*deepest + 1).max(0) as usize)
        .unwrap_or(0);
    let avg_children = if with_children == 0 {
        0.0
    } else {
        (total - roots) as f64 / with_children as f64
    };

    ForestStatistics {
        total_categories: total,
        root_categories: roots,
        leaf_categories: leaves,
        max_depth,
        levels,
        categories_with_children: with_children,
        avg_children,
    }
}
