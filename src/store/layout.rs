//! `.crystalproj` directory shape (spec.md §6.1): discoverable marker files,
//! the revision tree roots, and the free-space guard that gates every body
//! write.

#[cfg(feature = "service")]
use std::path::Path;
use std::path::PathBuf;

use crate::error::CrystalError;

/// Magic bytes written to `OPEN ME.<opener>` (spec.md §6.1 "four-CC").
pub const OPENER_MAGIC: &[u8; 4] = b"CrOp";

pub const DATABASE_FILE: &str = "database.db";
pub const REVISIONS_DIR: &str = "revisions";
pub const REVISIONS_INPROGRESS_DIR: &str = "revisions.inprogress";
pub const TMP_DIR: &str = "tmp";
pub const OPENER_FILE: &str = "OPEN ME.crystalopen";
pub const README_FILE: &str = "README.txt";

/// Bytes below which a body write is refused with `DiskFull` (spec.md §4.1
/// "Free-space guard"): `min(4 GiB, 5% of volume)`.
pub const MAX_FREE_SPACE_FLOOR: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProjectLayout { root: root.into() }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn revisions_dir(&self) -> PathBuf {
        self.root.join(REVISIONS_DIR)
    }

    pub fn revisions_inprogress_dir(&self) -> PathBuf {
        self.root.join(REVISIONS_INPROGRESS_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn opener_path(&self) -> PathBuf {
        self.root.join(OPENER_FILE)
    }

    pub fn readme_path(&self) -> PathBuf {
        self.root.join(README_FILE)
    }

    /// spec.md §4.1 open-sequence step 1: "reject if the database file is
    /// absent and the directory is non-empty".
    pub fn validate_shape(&self) -> Result<(), CrystalError> {
        if !self.root.exists() {
            return Ok(()); // a brand new project directory is valid
        }
        let is_non_empty = self
            .root
            .read_dir()
            .map_err(CrystalError::from)?
            .next()
            .is_some();
        if is_non_empty && !self.database_path().exists() {
            return Err(CrystalError::InvalidProjectDirectory {
                path: self.root.display().to_string(),
                reason: "directory is non-empty but has no database file".to_string(),
            });
        }
        Ok(())
    }

    /// spec.md §4.1 open-sequence step 6: "Clear the tmp/ directory;
    /// recreate missing discoverable files."
    pub fn prepare_writable(&self) -> Result<(), CrystalError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.revisions_dir())?;

        let tmp = self.tmp_dir();
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(&tmp)?;

        if !self.opener_path().exists() {
            std::fs::write(self.opener_path(), OPENER_MAGIC)?;
        }
        if !self.readme_path().exists() {
            std::fs::write(
                self.readme_path(),
                "This directory is a Crystal archive project. Do not edit its contents by hand.\n",
            )?;
        }
        Ok(())
    }
}

/// spec.md §4.1 "Free-space guard": refuse a body write when the volume
/// containing `path` has less than `min(4 GiB, 5% of volume)` free.
#[cfg(feature = "service")]
pub fn check_free_space(path: &Path, additional_bytes: u64) -> Result<(), CrystalError> {
    let mut disks = sysinfo::Disks::new_with_refreshed_list();
    disks.refresh(true);

    let mount = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .ok_or_else(|| CrystalError::Io(format!("no mounted volume found for {path:?}")))?;

    let available = mount.available_space();
    let total = mount.total_space();
    let floor = MAX_FREE_SPACE_FLOOR.min(total / 20);
    if available < floor + additional_bytes {
        return Err(CrystalError::DiskFull {
            available,
            required: floor + additional_bytes,
        });
    }
    Ok(())
}
