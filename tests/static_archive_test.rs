//! End-to-end scenario: a static comic archive (spec.md §8 scenario 1).
//!
//! Root Resource + Resource Group + a handful of revisions, checked for
//! membership count, revision count, and reopen-consistency.

#![cfg(feature = "service")]

use crystal_core::entity::model::GetOrCreateOutcome;
use crystal_core::entity::resource::{GroupSource, ResourceGroup};
use crystal_core::{CrystalError, OpenOptions};

async fn open(dir: &std::path::Path) -> crystal_core::ProjectStore {
    crystal_core::ProjectStore::open(dir, OpenOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn comic_archive_survives_a_reopen() -> Result<(), CrystalError> {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("comics.crystalproj");

    {
        let store = open(&project_dir).await;

        let index_id = match store.get_or_create("http://example.com/comic/index").await? {
            GetOrCreateOutcome::Resource { id, .. } => id,
            _ => panic!("expected a resource"),
        };
        let root = store.insert_root_resource("comic-index", index_id).await?;

        let group = store
            .insert_resource_group(ResourceGroup {
                id: 0,
                name: "pages".to_string(),
                url_pattern: "http://example.com/comic/#".to_string(),
                source: Some(GroupSource::RootResource(root.id)),
                do_not_download: false,
            })
            .await?;

        let pages: Vec<String> = (1..=5)
            .map(|n| format!("http://example.com/comic/{n}"))
            .collect();
        let outcomes = store.bulk_get_or_create(&pages).await?;
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, GetOrCreateOutcome::Resource { created: true, .. })));

        for outcome in &outcomes {
            let GetOrCreateOutcome::Resource { id, .. } = outcome else {
                unreachable!()
            };
            store
                .write_revision(*id, None, None, None, Some(b"<html>page</html>"))
                .await?;
        }

        let members = store.model.group_members_in_memory(&group).unwrap();
        assert_eq!(members.len(), 5);

        for outcome in &outcomes {
            let GetOrCreateOutcome::Resource { id, .. } = outcome else {
                unreachable!()
            };
            let latest = store.latest_revision(*id).await?.unwrap();
            assert!(latest.is_success());
            assert!(latest.has_body);
        }
    }

    // Reopen: the model must rebuild to the same membership count and every
    // revision body must still be readable from its fanout path.
    let reopened = open(&project_dir).await;
    let reloaded_group = ResourceGroup {
        id: 0,
        name: "pages".to_string(),
        url_pattern: "http://example.com/comic/#".to_string(),
        source: None,
        do_not_download: false,
    };
    let members = reopened.model.group_members_in_memory(&reloaded_group).unwrap();
    assert_eq!(members.len(), 5);

    let page3 = reopened.get_or_create("http://example.com/comic/3").await?;
    match page3 {
        GetOrCreateOutcome::Resource { created, .. } => assert!(!created),
        _ => panic!("expected an existing resource"),
    }

    Ok(())
}
