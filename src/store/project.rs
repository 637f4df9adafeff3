//! `ProjectStore`: the façade spec.md §4.1 describes — owns the database
//! handle and the revision tree, runs the open sequence, and is the only
//! component permitted to write either.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use sqlx::{Pool, Row, Sqlite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::OpenOptions;
use crate::entity::model::{EntityModel, GetOrCreateOutcome};
use crate::entity::normalize::{self, Normalized, NormalizeConfig};
use crate::entity::pattern;
use crate::entity::resource::{
    Alias, EntityTitleFormat, HtmlParserType, ProjectProperties, Resource, ResourceGroup,
    ResourceId, Revision, RevisionError, RevisionId, ResponseMetadata, RootResource,
};
use crate::error::CrystalError;
use crate::event::RevisionCommitted;
use crate::scheduler::task::TaskNode;
use crate::store::db;
use crate::store::layout::{self, ProjectLayout};
use crate::store::revisions;

/// Above this many Resource rows, membership queries prefer a database-backed
/// strategy over `EntityModel::group_members_in_memory`'s full scan (spec.md
/// §4.2: three membership strategies "chosen per group/project size").
const LARGE_PROJECT_RESOURCE_THRESHOLD: i64 = 50_000;

/// Page size for the streaming-cursor membership strategy (spec.md §4.2
/// strategy 3), keeping any single query's working set bounded regardless of
/// project size.
const MEMBERSHIP_CURSOR_PAGE_SIZE: i64 = 5_000;

/// How [`ProjectStore::open`] actually opened the directory (spec.md §4.1
/// "one of three modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Writable,
    ReadOnly,
    Migrating,
}

pub struct ProjectStore {
    pub layout: ProjectLayout,
    pub mode: OpenMode,
    pub(crate) pool: Pool<Sqlite>,
    pub model: Arc<EntityModel>,
    pub options: OpenOptions,
    pub major_version: i64,
    /// Set once by a host that wants [`RevisionCommitted`] notifications
    /// (spec.md §6.5); deferred the same way `DownloadPipeline::scheduler`
    /// is, since the listener is usually wired up after `open` returns.
    revision_events: OnceLock<mpsc::UnboundedSender<RevisionCommitted>>,
}

/// Latest project format version this build understands (spec.md §4.1 step
/// 3, `ProjectTooNew`).
pub const LATEST_MAJOR_VERSION: i64 = 2;

impl ProjectStore {
    /// spec.md §4.1 "Open sequence", steps 1-6.
    pub async fn open(root: impl AsRef<Path>, options: OpenOptions) -> Result<Self, CrystalError> {
        let layout = ProjectLayout::new(root.as_ref());
        layout.validate_shape()?; // step 1

        let read_only = options.force_read_only || is_locked(&layout);
        let is_fresh = !layout.database_path().exists();
        if !read_only {
            layout.prepare_writable()?; // step 6, done early so db_init can create dirs
        }

        let pool = db::db_init(&layout.database_path(), read_only).await?; // step 2

        if !read_only && is_fresh {
            // A brand-new project starts already on the latest format; with
            // no row seeded here `load_properties` would fall back to its
            // `major_version: 1` default forever, and every write would land
            // in the legacy flat body layout instead of the v2 fanout one.
            seed_major_version(&pool, LATEST_MAJOR_VERSION).await?;
        }

        let mut properties = load_properties(&pool).await?;

        if properties.major_version > LATEST_MAJOR_VERSION {
            return Err(CrystalError::ProjectTooNew {
                found: properties.major_version,
                latest: LATEST_MAJOR_VERSION,
            }); // step 3
        }

        let mut mode = if read_only {
            OpenMode::ReadOnly
        } else {
            OpenMode::Writable
        };

        if !read_only {
            // step 4: repair step
            if properties.migration_in_progress() {
                mode = OpenMode::Migrating;
                warn!(
                    from = properties.major_version_old,
                    to = LATEST_MAJOR_VERSION,
                    "resuming interrupted migration"
                );
                resume_migration(&pool, &layout).await?;
                properties = load_properties(&pool).await?;
            } else if properties.major_version == LATEST_MAJOR_VERSION
                && layout.revisions_inprogress_dir().exists()
            {
                info!("completing interrupted v1->v2 filesystem finalization");
                revisions::finalize_v1_to_v2_swap(&layout).await?;
            }

            repair_orphaned_revisions(&pool, &layout, properties.major_version).await?;
        }

        let normalize_config = NormalizeConfig {
            aliases: load_aliases(&pool).await?,
            fragment_significant_hosts: Vec::new(),
            plugins: Vec::new(),
        };
        let model = Arc::new(EntityModel::new(normalize_config));
        load_entities_into_model(&pool, &model).await?;

        Ok(ProjectStore {
            layout,
            mode,
            pool,
            model,
            options,
            major_version: properties.major_version,
            revision_events: OnceLock::new(),
        })
    }

    /// Registers a sink for [`RevisionCommitted`] events (spec.md §6.5); a
    /// host uses this to invalidate a serving-layer cache without polling.
    pub fn attach_revision_listener(&self, sender: mpsc::UnboundedSender<RevisionCommitted>) {
        let _ = self.revision_events.set(sender);
    }

    /// Starts the major_version 1 -> 2 migration (spec.md §4.1) on a project
    /// still on the legacy flat revision layout. Marks the migration
    /// in-progress durably before touching the filesystem, so a crash at any
    /// point after this call resumes correctly on the project's next
    /// [`Self::open`].
    pub async fn begin_major_version_1_to_2_migration(&self) -> Result<(), CrystalError> {
        self.require_writable()?;
        if self.major_version != 1 {
            return Err(CrystalError::Io(format!(
                "cannot migrate: project is already on major_version {}",
                self.major_version
            )));
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO project_property (name, value) VALUES ('major_version_old', '1') \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        resume_migration(&self.pool, &self.layout).await
    }

    pub async fn properties(&self) -> Result<ProjectProperties, CrystalError> {
        load_properties(&self.pool).await
    }

    /// spec.md §4.3 "Hibernation & resume" step 1: durably persist a
    /// [`crate::scheduler::engine::SchedulerHandle::hibernation_snapshot`]
    /// before the host process exits.
    pub async fn save_hibernated_tasks(&self, tasks: &[TaskNode]) -> Result<(), CrystalError> {
        self.require_writable()?;
        let json = serde_json::to_string(tasks)?;
        sqlx::query(
            "INSERT INTO project_property (name, value) VALUES ('hibernated_tasks', ?) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(&json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// spec.md §4.3 "Hibernation & resume" step 2: read back the snapshot a
    /// prior session left, for
    /// [`crate::scheduler::engine::SchedulerHandle::resume_hibernated`].
    /// Empty if the project hibernated cleanly with nothing in flight.
    pub async fn load_hibernated_tasks(&self) -> Result<Vec<TaskNode>, CrystalError> {
        let row = sqlx::query("SELECT value FROM project_property WHERE name = 'hibernated_tasks'")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(Vec::new()) };
        let json: String = row.get(0);
        Ok(serde_json::from_str(&json)?)
    }

    /// Clears the persisted snapshot once its tasks have been resumed, so a
    /// crash between resume and the next hibernation doesn't replay stale
    /// work on top of tasks already re-enqueued.
    pub async fn clear_hibernated_tasks(&self) -> Result<(), CrystalError> {
        self.require_writable()?;
        sqlx::query("DELETE FROM project_property WHERE name = 'hibernated_tasks'")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn is_writable(&self) -> bool {
        self.mode != OpenMode::ReadOnly
    }

    fn require_writable(&self) -> Result<(), CrystalError> {
        if !self.is_writable() {
            return Err(CrystalError::ProjectReadOnly(
                self.layout.root.display().to_string(),
            ));
        }
        Ok(())
    }

    /// spec.md §4.1 "Entity persistence": single-row writes use one
    /// transaction each.
    pub async fn insert_resource_row(&self, url: &str) -> Result<ResourceId, CrystalError> {
        self.require_writable()?;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("INSERT INTO resource (url) VALUES (?) RETURNING id")
            .bind(url)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ResourceId(row.get::<i64, _>(0)))
    }

    /// spec.md §4.2 "Bulk form accepts a list and performs one database
    /// round-trip for the whole batch."
    pub async fn bulk_insert_resource_rows(
        &self,
        urls: &[String],
    ) -> Result<Vec<ResourceId>, CrystalError> {
        self.require_writable()?;
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = sqlx::QueryBuilder::<Sqlite>::new("INSERT INTO resource (url) ");
        qb.push_values(urls, |mut b, url| {
            b.push_bind(url);
        });
        qb.push(" RETURNING id");
        let mut tx = self.pool.begin().await?;
        let rows = qb.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows
            .into_iter()
            .map(|row| ResourceId(row.get::<i64, _>(0)))
            .collect())
    }

    /// spec.md §4.2 "Resource creation", wired to this store's async sqlite
    /// pool rather than a synchronous closure — `EntityModel::get_or_create`
    /// stays a pure sync helper for callers (tests, offline validation) that
    /// supply their own id source.
    pub async fn get_or_create(&self, raw_url: &str) -> Result<GetOrCreateOutcome, CrystalError> {
        match self.model.normalize(raw_url)? {
            Normalized::External(wrapped) => Ok(GetOrCreateOutcome::External(wrapped)),
            Normalized::Internal(canonical) => {
                for candidate in normalize::resource_url_alternatives(&canonical) {
                    if let Some(id) = self.model.lookup_url(&candidate) {
                        return Ok(GetOrCreateOutcome::Resource { id, created: false });
                    }
                }
                let id = self.insert_resource_row(&canonical).await?;
                self.model.insert_known(Resource {
                    id,
                    url: canonical,
                });
                Ok(GetOrCreateOutcome::Resource { id, created: true })
            }
        }
    }

    /// Bulk form of [`Self::get_or_create`]: one round-trip for every URL not
    /// already known, results partitioned in input order (spec.md §4.2).
    pub async fn bulk_get_or_create(
        &self,
        raw_urls: &[String],
    ) -> Result<Vec<GetOrCreateOutcome>, CrystalError> {
        let mut outcomes: Vec<Option<GetOrCreateOutcome>> = vec![None; raw_urls.len()];
        let mut to_persist_indices = Vec::new();
        let mut to_persist_urls = Vec::new();

        for (i, raw) in raw_urls.iter().enumerate() {
            match self.model.normalize(raw)? {
                Normalized::External(wrapped) => {
                    outcomes[i] = Some(GetOrCreateOutcome::External(wrapped));
                }
                Normalized::Internal(canonical) => {
                    let existing = normalize::resource_url_alternatives(&canonical)
                        .into_iter()
                        .find_map(|c| self.model.lookup_url(&c));
                    match existing {
                        Some(id) => {
                            outcomes[i] = Some(GetOrCreateOutcome::Resource { id, created: false })
                        }
                        None => {
                            to_persist_indices.push(i);
                            to_persist_urls.push(canonical);
                        }
                    }
                }
            }
        }

        if !to_persist_urls.is_empty() {
            let ids = self.bulk_insert_resource_rows(&to_persist_urls).await?;
            for ((idx, url), id) in to_persist_indices.into_iter().zip(to_persist_urls).zip(ids) {
                self.model.insert_known(Resource { id, url });
                outcomes[idx] = Some(GetOrCreateOutcome::Resource { id, created: true });
            }
        }

        Ok(outcomes.into_iter().map(|o| o.unwrap()).collect())
    }

    /// spec.md §4.1 "Revision write protocol": stage the body, commit the
    /// row, then rename the staged file into place; if the rename fails the
    /// staged file is abandoned rather than left for the next orphan scan to
    /// find prematurely.
    pub async fn write_revision(
        &self,
        resource_id: ResourceId,
        request_cookie: Option<&str>,
        error: Option<&RevisionError>,
        metadata: Option<&ResponseMetadata>,
        body: Option<&[u8]>,
    ) -> Result<i64, CrystalError> {
        self.require_writable()?;

        if let Some(bytes) = body {
            layout::check_free_space(&self.layout.root, bytes.len() as u64)?;
        }

        // Stage under the resource id, not the (not yet known) revision id —
        // `finalize_body` takes the real revision id separately once the row
        // commits, so the temp name only needs to be unique per in-flight
        // write. Admission dedup (spec.md §4.3) guarantees at most one
        // concurrent write per resource.
        let staged = match body {
            Some(bytes) if !bytes.is_empty() => {
                Some(revisions::stage_body(&self.layout, resource_id.0, bytes).await?)
            }
            _ => None,
        };

        let error_json = match error {
            Some(e) => serde_json::to_string(e)?,
            None => "null".to_string(),
        };
        let metadata_json = match metadata {
            Some(m) => serde_json::to_string(m)?,
            None => "{}".to_string(),
        };

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO resource_revision (resource_id, request_cookie, error, metadata) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(resource_id.0)
        .bind(request_cookie)
        .bind(&error_json)
        .bind(&metadata_json)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let revision_id: i64 = row.get(0);

        if let Some(staged_path) = staged {
            match revisions::finalize_body(&self.layout, self.major_version, revision_id, &staged_path)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    // spec.md §4.1 step 5: the row already committed; abandon
                    // the staged file rather than leave a half-renamed body.
                    let _ = revisions::abandon_staged_body(&staged_path).await;
                    return Err(e);
                }
            }
        }

        if let Some(tx) = self.revision_events.get() {
            let _ = tx.send(RevisionCommitted {
                resource_id,
                revision_id,
                is_error: error.is_some(),
            });
        }

        Ok(revision_id)
    }

    /// Most recent Revision for a Resource, if any (spec.md §4.4 step 1
    /// session-fresh check).
    pub async fn latest_revision(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<Revision>, CrystalError> {
        let row = sqlx::query(
            "SELECT id, request_cookie, error, metadata FROM resource_revision \
             WHERE resource_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(resource_id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };

        let error_json: String = row.get(2);
        let error = if error_json == "null" {
            None
        } else {
            Some(serde_json::from_str(&error_json)?)
        };
        let metadata_json: String = row.get(3);
        let metadata = if metadata_json == "{}" || metadata_json == "null" {
            None
        } else {
            Some(serde_json::from_str(&metadata_json)?)
        };
        let revision_id: i64 = row.get(0);
        let has_body = revisions::body_path(&self.layout, self.major_version, revision_id)
            .try_exists()
            .unwrap_or(false);

        Ok(Some(Revision {
            id: RevisionId(revision_id),
            resource_id,
            request_cookie: row.get(1),
            error,
            metadata,
            has_body,
        }))
    }

    /// The Default Revision (spec.md §3.2): the most recent Revision with no
    /// error, tie-broken by largest id. Distinct from [`Self::latest_revision`],
    /// which returns the newest Revision regardless of outcome — callers that
    /// want "what should be served/considered current" (session-fresh checks,
    /// a serving layer) want this one instead.
    pub async fn default_revision(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<Revision>, CrystalError> {
        let row = sqlx::query(
            "SELECT id, request_cookie, error, metadata FROM resource_revision \
             WHERE resource_id = ? AND error = 'null' ORDER BY id DESC LIMIT 1",
        )
        .bind(resource_id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };

        let metadata_json: String = row.get(3);
        let metadata = if metadata_json == "{}" || metadata_json == "null" {
            None
        } else {
            Some(serde_json::from_str(&metadata_json)?)
        };
        let revision_id: i64 = row.get(0);
        let has_body = revisions::body_path(&self.layout, self.major_version, revision_id)
            .try_exists()
            .unwrap_or(false);

        Ok(Some(Revision {
            id: RevisionId(revision_id),
            resource_id,
            request_cookie: row.get(1),
            error: None,
            metadata,
            has_body,
        }))
    }

    /// Reads a revision's body off disk; `Err(RevisionBodyMissing)` if the
    /// file is absent (orphan repair should have already removed the row in
    /// that case, but a direct caller should still get a typed error).
    pub async fn read_revision_body(&self, revision_id: i64) -> Result<Vec<u8>, CrystalError> {
        let path = revisions::body_path(&self.layout, self.major_version, revision_id);
        tokio::fs::read(&path)
            .await
            .map_err(|_| CrystalError::RevisionBodyMissing(revision_id))
    }

    pub async fn insert_root_resource(
        &self,
        name: &str,
        resource_id: ResourceId,
    ) -> Result<RootResource, CrystalError> {
        self.require_writable()?;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO root_resource (name, resource_id) VALUES (?, ?) RETURNING id",
        )
        .bind(name)
        .bind(resource_id.0)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let root = RootResource {
            id: row.get::<i64, _>(0),
            name: name.to_string(),
            resource_id,
        };
        self.model.insert_root_resource(root.clone());
        Ok(root)
    }

    /// Persists a new Alias row. Existing Resources are not renormalized
    /// retroactively (spec.md §4.2 "Aliases apply going forward"); the
    /// NormalizeConfig a running `ProjectStore` holds is only refreshed on
    /// the next open.
    pub async fn insert_alias(&self, alias: Alias) -> Result<Alias, CrystalError> {
        self.require_writable()?;
        alias.validate()?;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO alias (source_url_prefix, target_url_prefix, target_is_external) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&alias.source_url_prefix)
        .bind(&alias.target_url_prefix)
        .bind(alias.target_is_external)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Alias {
            id: row.get::<i64, _>(0),
            ..alias
        })
    }

    pub async fn insert_resource_group(
        &self,
        group: ResourceGroup,
    ) -> Result<ResourceGroup, CrystalError> {
        self.require_writable()?;
        let (source_type, source_id) = match &group.source {
            None => (None, None),
            Some(crate::entity::resource::GroupSource::RootResource(id)) => {
                (Some("root_resource"), Some(*id))
            }
            Some(crate::entity::resource::GroupSource::Group(id)) => (Some("group"), Some(*id)),
        };
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO resource_group (name, url_pattern, source_type, source_id, do_not_download) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&group.name)
        .bind(&group.url_pattern)
        .bind(source_type)
        .bind(source_id)
        .bind(group.do_not_download)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let saved = ResourceGroup {
            id: row.get::<i64, _>(0),
            ..group
        };
        self.model.insert_group(saved.clone());
        Ok(saved)
    }

    /// spec.md §4.2 "three membership strategies... chosen per group/project
    /// size": picks the in-memory linear scan for small projects, a prefix
    /// range query when the pattern's leading segment is literal, and the
    /// streaming cursor otherwise.
    pub async fn group_members(&self, group: &ResourceGroup) -> Result<Vec<ResourceId>, CrystalError> {
        let resource_count: i64 = sqlx::query("SELECT COUNT(*) FROM resource")
            .fetch_one(&self.pool)
            .await?
            .get(0);

        if resource_count <= LARGE_PROJECT_RESOURCE_THRESHOLD {
            return self.model.group_members_in_memory(group);
        }
        if pattern::has_literal_prefix(&group.url_pattern) {
            return self.group_members_by_prefix(group).await;
        }
        self.group_members_streaming(group).await
    }

    /// Membership strategy 2 (spec.md §4.2): narrow to a URL-prefix range via
    /// SQL, then regex-filter the (already small) candidate set in memory for
    /// any wildcard segments past the literal prefix.
    pub async fn group_members_by_prefix(
        &self,
        group: &ResourceGroup,
    ) -> Result<Vec<ResourceId>, CrystalError> {
        let prefix = pattern::literal_prefix(&group.url_pattern);
        let regex = pattern::compile_pattern(&group.url_pattern)?;
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let like_pattern = format!("{escaped}%");

        let rows = sqlx::query("SELECT id, url FROM resource WHERE url LIKE ? ESCAPE '\\'")
            .bind(&like_pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let url: String = row.get(1);
                regex.is_match(&url).then(|| ResourceId(row.get(0)))
            })
            .collect())
    }

    /// Membership strategy 3 (spec.md §4.2): page through every Resource row
    /// in id order, never materializing the full table at once, for projects
    /// too large for the in-memory scan and groups whose pattern has no
    /// literal prefix to range on.
    pub async fn group_members_streaming(
        &self,
        group: &ResourceGroup,
    ) -> Result<Vec<ResourceId>, CrystalError> {
        let regex = pattern::compile_pattern(&group.url_pattern)?;
        let mut matches = Vec::new();
        let mut after_id = 0i64;
        loop {
            let rows = sqlx::query(
                "SELECT id, url FROM resource WHERE id > ? ORDER BY id LIMIT ?",
            )
            .bind(after_id)
            .bind(MEMBERSHIP_CURSOR_PAGE_SIZE)
            .fetch_all(&self.pool)
            .await?;
            let page_len = rows.len();
            for row in rows {
                let id: i64 = row.get(0);
                let url: String = row.get(1);
                after_id = id;
                if regex.is_match(&url) {
                    matches.push(ResourceId(id));
                }
            }
            if (page_len as i64) < MEMBERSHIP_CURSOR_PAGE_SIZE {
                break;
            }
        }
        Ok(matches)
    }
}

fn is_locked(layout: &ProjectLayout) -> bool {
    // A crate-external lock indicator (another process holding the sqlite
    // file open exclusively) would be detected by the connect attempt
    // itself; this checks only the coarse case of a read-only filesystem.
    layout
        .root
        .metadata()
        .map(|m| m.permissions().readonly())
        .unwrap_or(false)
}

async fn seed_major_version(pool: &Pool<Sqlite>, version: i64) -> Result<(), CrystalError> {
    sqlx::query("INSERT INTO project_property (name, value) VALUES ('major_version', ?)")
        .bind(version.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Finishes a major_version 1 -> 2 migration forward (spec.md §9 Open
/// Question 1: "resume at the rename-shuffle" rather than roll back). Safe to
/// call redundantly: [`revisions::migrate_bodies_v1_to_v2`] treats an
/// already-moved body as done, and the `major_version` UPDATE only runs once
/// `major_version_old` is actually present.
async fn resume_migration(pool: &Pool<Sqlite>, layout: &ProjectLayout) -> Result<(), CrystalError> {
    let ids: Vec<i64> = sqlx::query("SELECT id FROM resource_revision ORDER BY id ASC")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.get(0))
        .collect();
    revisions::migrate_bodies_v1_to_v2(layout, &ids, |_, _| {}).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE project_property SET value = ? WHERE name = 'major_version'")
        .bind(LATEST_MAJOR_VERSION.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM project_property WHERE name = 'major_version_old'")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    revisions::finalize_v1_to_v2_swap(layout).await
}

async fn load_properties(pool: &Pool<Sqlite>) -> Result<ProjectProperties, CrystalError> {
    let rows = sqlx::query("SELECT name, value FROM project_property")
        .fetch_all(pool)
        .await?;
    let mut props = ProjectProperties::default();
    for row in rows {
        let name: String = row.get(0);
        let value: String = row.get(1);
        match name.as_str() {
            "major_version" => props.major_version = value.parse().unwrap_or(1),
            "major_version_old" => props.major_version_old = value.parse().ok(),
            "default_url_prefix" => props.default_url_prefix = Some(value),
            "html_parser_type" => {
                props.html_parser_type = match value.as_str() {
                    "soup" => HtmlParserType::Soup,
                    _ => HtmlParserType::Basic,
                }
            }
            "entity_title_format" => {
                props.entity_title_format = match value.as_str() {
                    "name_url" => EntityTitleFormat::NameUrl,
                    _ => EntityTitleFormat::UrlName,
                }
            }
            _ => debug!(%name, "ignoring unknown project_property"),
        }
    }
    Ok(props)
}

async fn load_aliases(pool: &Pool<Sqlite>) -> Result<Vec<Alias>, CrystalError> {
    let rows = sqlx::query(
        "SELECT id, source_url_prefix, target_url_prefix, target_is_external FROM alias ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| Alias {
            id: row.get(0),
            source_url_prefix: row.get(1),
            target_url_prefix: row.get(2),
            target_is_external: row.get::<i64, _>(3) != 0,
        })
        .collect())
}

async fn load_entities_into_model(
    pool: &Pool<Sqlite>,
    model: &Arc<EntityModel>,
) -> Result<(), CrystalError> {
    let resources = sqlx::query("SELECT id, url FROM resource")
        .fetch_all(pool)
        .await?;
    for row in resources {
        model.insert_known(Resource {
            id: ResourceId(row.get(0)),
            url: row.get(1),
        });
    }

    let roots = sqlx::query("SELECT id, name, resource_id FROM root_resource")
        .fetch_all(pool)
        .await?;
    for row in roots {
        model.insert_root_resource(RootResource {
            id: row.get(0),
            name: row.get(1),
            resource_id: ResourceId(row.get(2)),
        });
    }

    let groups = sqlx::query(
        "SELECT id, name, url_pattern, source_type, source_id, do_not_download FROM resource_group",
    )
    .fetch_all(pool)
    .await?;
    for row in groups {
        let source_type: Option<String> = row.get(3);
        let source_id: Option<i64> = row.get(4);
        let source = match (source_type.as_deref(), source_id) {
            (Some("root_resource"), Some(id)) => {
                Some(crate::entity::resource::GroupSource::RootResource(id))
            }
            (Some("group"), Some(id)) => Some(crate::entity::resource::GroupSource::Group(id)),
            _ => None,
        };
        model.insert_group(ResourceGroup {
            id: row.get(0),
            name: row.get(1),
            url_pattern: row.get(2),
            source,
            do_not_download: row.get::<i64, _>(5) != 0,
        });
    }
    Ok(())
}

/// spec.md §4.1 step 4, last clause: "scan the highest revision id for an
/// orphaned body missing its database row and delete the orphan (§7)."
async fn repair_orphaned_revisions(
    pool: &Pool<Sqlite>,
    layout: &ProjectLayout,
    major_version: i64,
) -> Result<(), CrystalError> {
    let ids: Vec<i64> = sqlx::query("SELECT id FROM resource_revision ORDER BY id DESC")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.get(0))
        .collect();

    let orphans = revisions::find_orphaned_rows(layout, major_version, &ids).await;
    for id in &orphans {
        warn!(revision_id = id, "deleting orphaned revision row");
        sqlx::query("DELETE FROM resource_revision WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}
