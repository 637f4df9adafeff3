//! Revision body write/read protocol and the major-version 1→2 migration
//! (spec.md §4.1, §6.3). This is the durability-critical path: every body
//! write follows temp-file → fsync → commit → rename → fsync-parent, so a
//! crash at any point leaves the project repairable on next open.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::CrystalError;
use crate::store::layout::ProjectLayout;

/// spec.md §9 Open Question 2: how many trailing revisions must be readable
/// before we trust that the very latest one's missing body is a genuine
/// orphan rather than a transient failure, not an in-flight write.
pub const ORPHAN_REPAIR_LOOKBACK: usize = 3;

/// Renames get an `fsync` of their parent directory at least this often
/// during the v1→v2 migration (spec.md §4.1 "every 4,096 renames").
pub const MIGRATION_FSYNC_INTERVAL: usize = 4096;

/// Resolves the on-disk path for a revision body under `revisions_root`,
/// given `major_version` (spec.md §6.3). Does not check existence. Takes the
/// bare revisions directory (not a `ProjectLayout`) so the same fanout logic
/// serves both the live `revisions/` tree and the `revisions.inprogress/`
/// staging tree during migration.
pub fn body_path_in(revisions_root: &Path, major_version: i64, revision_id: i64) -> PathBuf {
    match major_version {
        1 => revisions_root.join(revision_id.to_string()),
        _ => {
            let hex = format!("{revision_id:015x}");
            let (aaa, rest) = hex.split_at(3);
            let (bbb, rest) = rest.split_at(3);
            let (ccc, rest) = rest.split_at(3);
            let (ddd, eee) = rest.split_at(3);
            revisions_root
                .join(aaa)
                .join(bbb)
                .join(ccc)
                .join(ddd)
                .join(eee)
        }
    }
}

pub fn body_path(layout: &ProjectLayout, major_version: i64, revision_id: i64) -> PathBuf {
    body_path_in(&layout.revisions_dir(), major_version, revision_id)
}

/// spec.md §4.1 "Revision write protocol" steps 2 and 4: stream bytes to a
/// temp file, fsync it, then the caller commits the database row, then calls
/// [`finalize_body`] to rename into place.
pub async fn stage_body(
    layout: &ProjectLayout,
    revision_id: i64,
    bytes: &[u8],
) -> Result<PathBuf, CrystalError> {
    let tmp_path = layout.tmp_dir().join(format!("revision-{revision_id}.tmp"));
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(tmp_path)
}

/// spec.md §4.1 step 4: "Rename the temp file to its final path; fsync its
/// parent directory." Called only after the INSERT+COMMIT for the row has
/// already succeeded.
pub async fn finalize_body(
    layout: &ProjectLayout,
    major_version: i64,
    revision_id: i64,
    staged_path: &Path,
) -> Result<(), CrystalError> {
    let final_path = body_path(layout, major_version, revision_id);
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(staged_path, &final_path).await?;
    fsync_dir(final_path.parent().unwrap_or(&layout.revisions_dir())).await?;
    Ok(())
}

/// spec.md §4.1 step 5: if finalization fails after the row commit, delete
/// the staged temp file so the next open's orphan scan doesn't see it.
pub async fn abandon_staged_body(staged_path: &Path) -> Result<(), CrystalError> {
    match fs::remove_file(staged_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn fsync_dir(dir: &Path) -> Result<(), CrystalError> {
    let f = fs::File::open(dir).await?;
    f.sync_all().await?;
    Ok(())
}

/// spec.md §4.1 step 6: "On reopen, proactively repair: if the last
/// revision's body is missing but three earlier revision bodies are
/// readable, delete the row." `revision_ids_desc` must be sorted newest
/// first; returns the ids whose rows should be deleted.
pub async fn find_orphaned_rows(
    layout: &ProjectLayout,
    major_version: i64,
    revision_ids_desc: &[i64],
) -> Vec<i64> {
    let mut orphans = Vec::new();
    let mut readable_run = 0usize;

    for (idx, &id) in revision_ids_desc.iter().enumerate() {
        let exists = fs::metadata(body_path(layout, major_version, id))
            .await
            .is_ok();
        if exists {
            readable_run += 1;
            continue;
        }
        if idx == 0 {
            // The very latest row's body is missing: only an orphan once we've
            // confirmed the run of predecessors is healthy.
            continue;
        }
        if readable_run >= ORPHAN_REPAIR_LOOKBACK {
            orphans.push(id);
        }
    }
    orphans
}

/// spec.md §4.1 "Major-version 1 → 2 migration". Moves every extant revision
/// body from the flat layout into the hierarchical one under
/// `revisions.inprogress/`, syncing the parent directory periodically so a
/// crash mid-migration loses no more than the last unsynced batch of renames.
pub async fn migrate_bodies_v1_to_v2(
    layout: &ProjectLayout,
    revision_ids: &[i64],
    mut report_progress: impl FnMut(usize, usize),
) -> Result<(), CrystalError> {
    let staging = layout.revisions_inprogress_dir();
    fs::create_dir_all(&staging).await?;

    let total = revision_ids.len();
    for (i, &id) in revision_ids.iter().enumerate() {
        let old_path = layout.revisions_dir().join(id.to_string());
        if fs::metadata(&old_path).await.is_err() {
            report_progress(i + 1, total);
            continue; // empty/error revision, no body to move
        }
        let new_path = body_path_in(&staging, 2, id);
        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&old_path, &new_path).await?;

        if (i + 1) % MIGRATION_FSYNC_INTERVAL == 0 {
            fsync_dir(new_path.parent().unwrap()).await?;
        }
        report_progress(i + 1, total);
    }
    fsync_dir(&staging).await?;
    Ok(())
}

/// spec.md §4.1 "this is the point-of-no-return": after the UPDATE
/// `major_version=2` + COMMIT has already happened, swap the directories.
/// Safe to call again if a crash happened between the two renames, since
/// a missing `revisions.inprogress/` with `revisions/` already in place means
/// the swap already completed.
pub async fn finalize_v1_to_v2_swap(layout: &ProjectLayout) -> Result<(), CrystalError> {
    let old_revisions = layout.revisions_dir();
    let inprogress = layout.revisions_inprogress_dir();
    let archived_old = layout.tmp_dir().join("old_revisions");

    if !inprogress.exists() {
        return Ok(()); // already finalized
    }
    if archived_old.exists() {
        fs::remove_dir_all(&archived_old).await?;
    }
    fs::rename(&old_revisions, &archived_old).await?;
    fs::rename(&inprogress, &old_revisions).await?;
    fsync_dir(&layout.root).await?;
    Ok(())
}
