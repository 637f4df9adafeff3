//! End-to-end scenario: major-version 1 -> 2 migration survives a crash
//! between the rename-shuffle and the directory swap (spec.md §8 scenario 3).
//!
//! The real open sequence drives this through `ProjectStore::open`
//! (`store::project::load_properties` + `revisions::finalize_v1_to_v2_swap`);
//! this test drives the filesystem half directly so it can simulate the
//! crash point precisely, the same way `store::revisions`'s own unit tests
//! do for the non-crash path.

#![cfg(feature = "service")]

use sqlx::Row;

use crystal_core::store::layout::ProjectLayout;
use crystal_core::store::project::ProjectStore;
use crystal_core::store::revisions::{
    body_path, finalize_v1_to_v2_swap, migrate_bodies_v1_to_v2,
};
use crystal_core::store::db;
use crystal_core::OpenOptions;
use tokio::fs;

const REVISION_COUNT: i64 = 5000;

#[tokio::test]
async fn migration_is_idempotent_across_a_simulated_crash() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    fs::create_dir_all(layout.revisions_dir()).await.unwrap();
    fs::create_dir_all(layout.tmp_dir()).await.unwrap();

    let ids: Vec<i64> = (1..=REVISION_COUNT).collect();
    for &id in &ids {
        fs::write(
            layout.revisions_dir().join(id.to_string()),
            format!("body-{id}"),
        )
        .await
        .unwrap();
    }

    // Move every body into revisions.inprogress/ under the v2 fanout layout.
    // In the real open sequence this runs before the `major_version=2`
    // UPDATE commits; a crash here resumes by re-running this same step,
    // which is safe because renames into the fanout tree are per-id and
    // idempotent (a missing source file is treated as "already moved").
    migrate_bodies_v1_to_v2(&layout, &ids, |_, _| {}).await.unwrap();

    // Simulate the crash: the directory swap (revisions/ <-> revisions.inprogress/)
    // never ran. On reopen, `ProjectStore::open` would see `major_version == 2`
    // (already committed) and `revisions.inprogress/` still present, and call
    // this same finalize step.
    assert!(layout.revisions_inprogress_dir().exists());
    finalize_v1_to_v2_swap(&layout).await.unwrap();
    assert!(!layout.revisions_inprogress_dir().exists());

    for &id in &ids {
        let path = body_path(&layout, 2, id);
        assert_eq!(fs::read(&path).await.unwrap(), format!("body-{id}").into_bytes());
    }

    // Calling finalize again (a second crash recovery attempt, or a host
    // that retries blindly) must be a no-op: the swap already happened.
    finalize_v1_to_v2_swap(&layout).await.unwrap();
    for &id in &ids {
        let path = body_path(&layout, 2, id);
        assert_eq!(fs::read(&path).await.unwrap(), format!("body-{id}").into_bytes());
    }
}

/// A project left with `major_version_old` set (the durable marker
/// `ProjectStore::begin_major_version_1_to_2_migration` writes before
/// touching the filesystem) must finish migrating the next time it is
/// opened, through `ProjectStore::open` itself rather than the raw
/// migration primitives.
#[tokio::test]
async fn reopening_a_project_with_an_in_progress_migration_marker_finishes_it() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    layout.prepare_writable().unwrap();

    let pool = db::db_init(&layout.database_path(), false).await.unwrap();

    let resource_id: i64 =
        sqlx::query("INSERT INTO resource (url) VALUES (?) RETURNING id")
            .bind("http://example.com/legacy")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);
    let revision_id: i64 = sqlx::query(
        "INSERT INTO resource_revision (resource_id, request_cookie, error, metadata) \
         VALUES (?, NULL, 'null', '{}') RETURNING id",
    )
    .bind(resource_id)
    .fetch_one(&pool)
    .await
    .unwrap()
    .get(0);

    sqlx::query("INSERT INTO project_property (name, value) VALUES ('major_version', '1')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO project_property (name, value) VALUES ('major_version_old', '1')")
        .execute(&pool)
        .await
        .unwrap();

    fs::write(
        layout.revisions_dir().join(revision_id.to_string()),
        b"legacy body",
    )
    .await
    .unwrap();

    pool.close().await;

    let store = ProjectStore::open(dir.path(), OpenOptions::default())
        .await
        .unwrap();

    assert_eq!(store.major_version, 2);
    assert!(!layout.revisions_inprogress_dir().exists());
    let properties = store.properties().await.unwrap();
    assert_eq!(properties.major_version, 2);
    assert!(properties.major_version_old.is_none());

    let body = store.read_revision_body(revision_id).await.unwrap();
    assert_eq!(body, b"legacy body");
}
