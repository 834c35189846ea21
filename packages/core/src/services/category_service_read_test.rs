//! Read Path Tests for CategoryService
//!
//! Covers hierarchy queries, search, statistics and the cached views. The
//! cache tests populate every view, mutate, and then require each cached read
//! to match a read that bypasses the cache.

#[cfg(test)]
mod tests {
    use crate::models::{CategoryNode, CategoryUpdate, CreateCategoryParams, MovePosition};
    use crate::services::{CategoryService, CategoryServiceError};

    async fn create(service: &CategoryService, title: &str, parent: Option<&str>) -> CategoryNode {
        let mut params = CreateCategoryParams::new(title);
        params.parent_id = parent.map(str::to_string);
        service.create_category(params).await.unwrap()
    }

    struct Fixture {
        service: CategoryService,
        electronics: CategoryNode,
        phones: CategoryNode,
        smartphones: CategoryNode,
        audio: CategoryNode,
        gadgets: CategoryNode,
    }

    impl Fixture {
        fn ids(&self) -> Vec<String> {
            [
                &self.electronics,
                &self.phones,
                &self.smartphones,
                &self.audio,
                &self.gadgets,
            ]
            .iter()
            .map(|n| n.id.clone())
            .collect()
        }
    }

    /// Electronics > (Phones > Smartphones, Audio) ; Gadgets
    async fn fixture() -> Fixture {
        let service = CategoryService::in_memory();
        let electronics = create(&service, "Electronics", None).await;
        let phones = create(&service, "Phones", Some(&electronics.id)).await;
        let smartphones = service
            .create_category(CreateCategoryParams {
                title: "Smartphones".to_string(),
                parent_id: Some(phones.id.clone()),
                description: Some("Touchscreen handsets".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let audio = create(&service, "Audio", Some(&electronics.id)).await;
        let gadgets = create(&service, "Gadgets", None).await;

        let electronics = service.get_category(&electronics.id).await.unwrap();
        let phones = service.get_category(&phones.id).await.unwrap();
        Fixture {
            service,
            electronics,
            phones,
            smartphones,
            audio,
            gadgets,
        }
    }

    fn titles(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    /// Read every view through the cache so all of them are populated
    async fn populate(service: &CategoryService, ids: &[String]) {
        service.warm_cache().await.unwrap();
        for id in ids {
            service.get_subtree(id, true).await.unwrap();
            service.get_breadcrumb(id, true).await.unwrap();
        }
    }

    async fn assert_cache_consistent(service: &CategoryService, ids: &[String]) {
        assert_eq!(
            service.get_tree(true).await.unwrap(),
            service.get_tree(false).await.unwrap()
        );
        assert_eq!(
            service.get_roots(true).await.unwrap(),
            service.get_roots(false).await.unwrap()
        );
        assert_eq!(
            service.get_statistics(true).await.unwrap(),
            service.get_statistics(false).await.unwrap()
        );
        for id in ids {
            assert_eq!(
                service.get_subtree(id, true).await.unwrap(),
                service.get_subtree(id, false).await.unwrap(),
                "subtree of {}",
                id
            );
            assert_eq!(
                service.get_breadcrumb(id, true).await.unwrap(),
                service.get_breadcrumb(id, false).await.unwrap(),
                "breadcrumb of {}",
                id
            );
        }
    }

    //
    // LOOKUPS AND HIERARCHY
    //

    #[tokio::test]
    async fn test_point_lookups() {
        let f = fixture().await;

        let by_slug = f.service.get_category_by_slug("phones").await.unwrap();
        assert_eq!(by_slug.id, f.phones.id);

        let err = f.service.get_category_by_slug("nope").await.unwrap_err();
        assert!(matches!(err, CategoryServiceError::NotFound { .. }));

        let err = f.service.get_category("nope").await.unwrap_err();
        assert!(matches!(err, CategoryServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_forest_view() {
        let f = fixture().await;
        let forest = f.service.get_tree(false).await.unwrap();

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].title, "Electronics");
        assert_eq!(forest[1].title, "Gadgets");
        let children: Vec<&str> = forest[0].children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(children, vec!["Phones", "Audio"]);
        assert_eq!(forest[0].children[0].children[0].title, "Smartphones");
        assert_eq!(forest[0].size(), 4);
    }

    #[tokio::test]
    async fn test_subtree_view() {
        let f = fixture().await;
        let subtree = f.service.get_subtree(&f.phones.id, false).await.unwrap();

        assert_eq!(subtree.id, f.phones.id);
        assert_eq!(subtree.children.len(), 1);
        assert_eq!(subtree.children[0].description, "Touchscreen handsets");

        let err = f.service.get_subtree("nope", true).await.unwrap_err();
        assert!(matches!(err, CategoryServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_ancestors_and_descendants() {
        let f = fixture().await;

        let ancestors = f.service.get_ancestors(&f.smartphones.id).await.unwrap();
        assert_eq!(titles(&ancestors), vec!["Electronics", "Phones"]);
        assert!(f.service.get_ancestors(&f.electronics.id).await.unwrap().is_empty());

        let descendants = f
            .service
            .get_descendants(&f.electronics.id, false)
            .await
            .unwrap();
        assert_eq!(titles(&descendants), vec!["Phones", "Smartphones", "Audio"]);
        assert_eq!(descendants.len() as i64, f.electronics.descendant_count());

        let with_self = f
            .service
            .get_descendants(&f.phones.id, true)
            .await
            .unwrap();
        assert_eq!(titles(&with_self), vec!["Phones", "Smartphones"]);
    }

    #[tokio::test]
    async fn test_children_and_siblings() {
        let f = fixture().await;

        let children = f.service.get_children(&f.electronics.id).await.unwrap();
        assert_eq!(titles(&children), vec!["Phones", "Audio"]);
        assert!(f.service.get_children(&f.audio.id).await.unwrap().is_empty());
        assert!(matches!(
            f.service.get_children("nope").await.unwrap_err(),
            CategoryServiceError::NotFound { .. }
        ));

        let siblings = f.service.get_siblings(&f.phones.id, false).await.unwrap();
        assert_eq!(titles(&siblings), vec!["Audio"]);
        let siblings = f.service.get_siblings(&f.phones.id, true).await.unwrap();
        assert_eq!(titles(&siblings), vec!["Phones", "Audio"]);

        // Roots are siblings of each other
        let siblings = f.service.get_siblings(&f.gadgets.id, false).await.unwrap();
        assert_eq!(titles(&siblings), vec!["Electronics"]);
    }

    #[tokio::test]
    async fn test_breadcrumbs() {
        let f = fixture().await;

        let crumbs = f.service.get_breadcrumb(&f.smartphones.id, true).await.unwrap();
        let names: Vec<&str> = crumbs.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(names, vec!["Electronics", "Phones", "Smartphones"]);
        assert_eq!(crumbs[1].slug, "phones");
        assert_eq!(crumbs[2].level, 2);

        let root = f.service.get_breadcrumb(&f.gadgets.id, true).await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].id, f.gadgets.id);

        assert_eq!(
            f.service.category_path(&f.audio.id).await.unwrap(),
            "Electronics > Audio"
        );
    }

    #[tokio::test]
    async fn test_category_stats() {
        let f = fixture().await;
        let stats = f.service.category_stats(&f.phones.id).await.unwrap();

        assert_eq!(stats.id, f.phones.id);
        assert_eq!(stats.level, 1);
        assert_eq!(stats.children_count, 1);
        assert_eq!(stats.descendants_count, 1);
        assert_eq!(stats.siblings_count, 1);
        assert!(!stats.is_leaf);
        assert!(!stats.is_root);
        assert_eq!(stats.path, "Electronics > Phones");

        let stats = f.service.category_stats(&f.gadgets.id).await.unwrap();
        assert!(stats.is_leaf && stats.is_root);
        assert_eq!(stats.siblings_count, 1);
    }

    //
    // SEARCH
    //

    #[tokio::test]
    async fn test_search() {
        let f = fixture().await;

        let hits = f.service.search_categories("PHONE", 20).await.unwrap();
        assert_eq!(titles(&hits), vec!["Phones", "Smartphones"]);

        let hits = f.service.search_categories("phone", 1).await.unwrap();
        assert_eq!(titles(&hits), vec!["Phones"]);

        // Description matches too
        let hits = f.service.search_categories("touchscreen", 20).await.unwrap();
        assert_eq!(titles(&hits), vec!["Smartphones"]);
    }

    #[tokio::test]
    async fn test_search_short_or_empty_queries() {
        let f = fixture().await;

        assert!(f.service.search_categories("p", 20).await.unwrap().is_empty());
        assert!(f.service.search_categories("  a  ", 20).await.unwrap().is_empty());
        assert!(f.service.search_categories("", 20).await.unwrap().is_empty());
        assert!(f.service.search_categories("phone", 0).await.unwrap().is_empty());
        assert!(f.service.search_categories("zzz", 20).await.unwrap().is_empty());
    }

    //
    // STATISTICS
    //

    #[tokio::test]
    async fn test_forest_statistics() {
        let f = fixture().await;
        let stats = f.service.get_statistics(false).await.unwrap();

        assert_eq!(stats.total_categories, 5);
        assert_eq!(stats.root_categories, 2);
        assert_eq!(stats.leaf_categories, 3);
        assert_eq!(stats.categories_with_children, 2);
        assert_eq!(stats.max_depth, 3);
        assert_eq!(stats.levels.get(&1), Some(&2));
        // three edges over two parents
        assert!((stats.avg_children - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_forest_statistics() {
        let service = CategoryService::in_memory();
        let stats = service.get_statistics(true).await.unwrap();
        assert_eq!(stats.total_categories, 0);
        assert_eq!(stats.max_depth, 0);
        assert_eq!(stats.avg_children, 0.0);
        assert!(service.get_tree(true).await.unwrap().is_empty());
    }

    //
    // PRE-CHECKS
    //

    #[tokio::test]
    async fn test_pre_checks() {
        let f = fixture().await;

        assert!(matches!(
            f.service.validate_slug("Phones", None).await.unwrap_err(),
            CategoryServiceError::SlugConflict { .. }
        ));
        assert_eq!(
            f.service
                .validate_slug("Phones", Some(&f.phones.id))
                .await
                .unwrap(),
            "phones"
        );
        assert_eq!(
            f.service.generate_unique_slug("Phones", None).await.unwrap(),
            "phones-1"
        );

        assert!(f
            .service
            .validate_parent(&f.phones.id, Some(&f.gadgets.id))
            .await
            .is_ok());
        assert!(f.service.validate_parent(&f.phones.id, None).await.is_ok());
        assert!(matches!(
            f.service
                .validate_parent(&f.electronics.id, Some(&f.smartphones.id))
                .await
                .unwrap_err(),
            CategoryServiceError::CyclicMove { .. }
        ));

        assert!(f.service.can_delete(&f.smartphones.id).await.is_ok());
        assert!(matches!(
            f.service.can_delete(&f.electronics.id).await.unwrap_err(),
            CategoryServiceError::HasChildren { children: 3, .. }
        ));
    }

    //
    // CACHE
    //

    #[tokio::test]
    async fn test_warm_and_clear_cache() {
        let f = fixture().await;

        let warmed = f.service.warm_cache().await.unwrap();
        assert_eq!(warmed, 5);
        let stats = f.service.cache_stats();
        assert!(stats.forest && stats.roots && stats.stats);
        assert_eq!(stats.subtrees, 2);
        assert_eq!(stats.breadcrumbs, 0);

        f.service.get_tree(true).await.unwrap();
        assert!(f.service.cache_stats().hits >= 1);

        let cleared = f.service.clear_cache().await;
        assert_eq!(cleared, 5);
        let stats = f.service.cache_stats();
        assert!(!stats.forest && !stats.roots && !stats.stats);
        assert_eq!(stats.subtrees, 0);
    }

    #[tokio::test]
    async fn test_cache_follows_mutations() {
        let f = fixture().await;
        let service = &f.service;
        let mut ids = f.ids();

        populate(service, &ids).await;
        let cases = create(service, "Cases", Some(&f.phones.id)).await;
        ids.push(cases.id.clone());
        assert_cache_consistent(service, &ids).await;

        service
            .move_category(&f.phones.id, Some(&f.gadgets.id), MovePosition::LastChild)
            .await
            .unwrap();
        assert_cache_consistent(service, &ids).await;

        service
            .update_category(
                &f.phones.id,
                CategoryUpdate {
                    title: Some("Mobile".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_cache_consistent(service, &ids).await;

        service
            .move_category(&f.audio.id, None, MovePosition::LastChild)
            .await
            .unwrap();
        assert_cache_consistent(service, &ids).await;

        service.delete_category(&cases.id, false).await.unwrap();
        ids.retain(|id| *id != cases.id);
        assert_cache_consistent(service, &ids).await;

        service.rebuild_tree().await.unwrap();
        assert_cache_consistent(service, &ids).await;
    }

    #[tokio::test]
    async fn test_cached_breadcrumb_after_move_and_rename() {
        let f = fixture().await;
        let service = &f.service;

        service.get_breadcrumb(&f.smartphones.id, true).await.unwrap();
        service
            .move_category(&f.phones.id, Some(&f.gadgets.id), MovePosition::LastChild)
            .await
            .unwrap();
        let path = service.category_path(&f.smartphones.id).await.unwrap();
        assert_eq!(path, "Gadgets > Phones > Smartphones");

        service
            .update_category(
                &f.phones.id,
                CategoryUpdate {
                    title: Some("Mobile".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let path = service.category_path(&f.smartphones.id).await.unwrap();
        assert_eq!(path, "Gadgets > Mobile > Smartphones");
    }

    #[tokio::test]
    async fn test_rename_keeps_statistics_cached() {
        let f = fixture().await;
        f.service.get_statistics(true).await.unwrap();
        f.service.get_tree(true).await.unwrap();

        f.service
            .update_category(
                &f.audio.id,
                CategoryUpdate {
                    title: Some("Sound".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = f.service.cache_stats();
        assert!(stats.stats);
        assert!(!stats.forest);
    }

    #[tokio::test]
    async fn test_bypass_does_not_populate_cache() {
        let f = fixture().await;
        f.service.get_tree(false).await.unwrap();
        f.service.get_subtree(&f.phones.id, false).await.unwrap();

        let stats = f.service.cache_stats();
        assert!(!stats.forest);
        assert_eq!(stats.subtrees, 0);
        assert_eq!(stats.hits + stats.misses, 0);
    }
}
