//! End-to-end scenario: redownloading a resource produces a new Revision with
//! a strictly higher id, while earlier revisions remain readable (spec.md §8
//! scenario 2).

#![cfg(feature = "service")]

use crystal_core::entity::model::GetOrCreateOutcome;
use crystal_core::entity::resource::ResponseMetadata;
use crystal_core::{CrystalError, OpenOptions};

#[tokio::test]
async fn redownload_adds_a_newer_revision_without_losing_the_old_one() -> Result<(), CrystalError> {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("redownload.crystalproj");
    let store = crystal_core::ProjectStore::open(&project_dir, OpenOptions::default()).await?;

    let id = match store.get_or_create("http://example.com/page").await? {
        GetOrCreateOutcome::Resource { id, .. } => id,
        _ => panic!("expected a resource"),
    };

    let metadata = ResponseMetadata {
        http_version: 11,
        status_code: 200,
        reason_phrase: "OK".to_string(),
        headers: Vec::new(),
    };
    let first = store
        .write_revision(id, None, None, Some(&metadata), Some(b"<html>v1</html>"))
        .await?;
    let second = store
        .write_revision(id, None, None, Some(&metadata), Some(b"<html>v2</html>"))
        .await?;

    assert!(second > first);

    // The old revision's body is untouched; only `latest_revision` moved on.
    assert_eq!(store.read_revision_body(first).await?, b"<html>v1</html>");
    assert_eq!(store.read_revision_body(second).await?, b"<html>v2</html>");

    let latest = store.latest_revision(id).await?.unwrap();
    assert_eq!(latest.id.0, second);

    Ok(())
}
