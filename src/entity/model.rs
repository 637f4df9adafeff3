//! In-memory Entity Model (spec.md §4.2).
//!
//! Holds the authoritative in-memory view of Resources, Root Resources,
//! Resource Groups and Aliases for a project. Durable persistence is not this
//! module's concern — [`crate::store::project::ProjectStore`] owns the sqlite
//! connection and passes a `persist` closure into [`EntityModel::get_or_create`]
//! so the two layers stay decoupled the way the teacher keeps its in-memory
//! belief index separate from `db.rs`'s connection pool.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::entity::normalize::{self, Normalized, NormalizeConfig};
use crate::entity::pattern;
use crate::entity::resource::{Resource, ResourceGroup, ResourceId, RootResource};
use crate::error::CrystalError;

struct ModelState {
    by_id: HashMap<ResourceId, Resource>,
    by_url: HashMap<String, ResourceId>,
    groups: HashMap<i64, ResourceGroup>,
    root_resources: HashMap<i64, RootResource>,
    next_pending_id: i64,
}

impl ModelState {
    fn new() -> Self {
        ModelState {
            by_id: HashMap::new(),
            by_url: HashMap::new(),
            groups: HashMap::new(),
            root_resources: HashMap::new(),
            next_pending_id: -1,
        }
    }
}

pub struct EntityModel {
    state: RwLock<ModelState>,
    pub normalize_config: NormalizeConfig,
}

/// Result of [`EntityModel::get_or_create`]: either a resolved (possibly
/// freshly inserted) Resource, or a URL that normalized to an external alias
/// target and therefore was never given a Resource at all (spec.md §4.2
/// step 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOrCreateOutcome {
    Resource { id: ResourceId, created: bool },
    External(String),
}

impl EntityModel {
    pub fn new(normalize_config: NormalizeConfig) -> Self {
        EntityModel {
            state: RwLock::new(ModelState::new()),
            normalize_config,
        }
    }

    pub fn normalize(&self, raw_url: &str) -> Result<Normalized, CrystalError> {
        normalize::normalize(raw_url, &self.normalize_config)
    }

    /// Registers a Resource already known to the store (used while loading a
    /// project at open time). Does not allocate an id.
    pub fn insert_known(&self, resource: Resource) {
        let mut state = self.state.write();
        state.by_url.insert(resource.url.clone(), resource.id);
        state.by_id.insert(resource.id, resource);
    }

    pub fn insert_group(&self, group: ResourceGroup) {
        self.state.write().groups.insert(group.id, group);
    }

    pub fn insert_root_resource(&self, root: RootResource) {
        self.state.write().root_resources.insert(root.id, root);
    }

    pub fn lookup_url(&self, url: &str) -> Option<ResourceId> {
        self.state.read().by_url.get(url).copied()
    }

    pub fn resource(&self, id: ResourceId) -> Option<Resource> {
        self.state.read().by_id.get(&id).cloned()
    }

    /// spec.md §4.2 "Resource creation": normalize, probe alternatives,
    /// return an existing Resource if any of them is already known, else
    /// call `persist` to obtain a durable id for the canonical form.
    pub fn get_or_create(
        &self,
        raw_url: &str,
        persist: impl FnOnce(&str) -> Result<ResourceId, CrystalError>,
    ) -> Result<GetOrCreateOutcome, CrystalError> {
        match self.normalize(raw_url)? {
            Normalized::External(wrapped) => Ok(GetOrCreateOutcome::External(wrapped)),
            Normalized::Internal(canonical) => {
                for candidate in normalize::resource_url_alternatives(&canonical) {
                    if let Some(id) = self.lookup_url(&candidate) {
                        return Ok(GetOrCreateOutcome::Resource { id, created: false });
                    }
                }
                let id = persist(&canonical)?;
                self.insert_known(Resource {
                    id,
                    url: canonical,
                });
                Ok(GetOrCreateOutcome::Resource { id, created: true })
            }
        }
    }

    /// Bulk form: one `persist_many` round-trip for every URL not already
    /// known, results partitioned `(created, existing)` in input order, per
    /// spec.md §4.2.
    pub fn bulk_get_or_create(
        &self,
        raw_urls: &[String],
        persist_many: impl FnOnce(&[String]) -> Result<Vec<ResourceId>, CrystalError>,
    ) -> Result<Vec<GetOrCreateOutcome>, CrystalError> {
        let mut outcomes: Vec<Option<GetOrCreateOutcome>> = vec![None; raw_urls.len()];
        let mut to_persist_indices = Vec::new();
        let mut to_persist_urls = Vec::new();

        for (i, raw) in raw_urls.iter().enumerate() {
            match self.normalize(raw)? {
                Normalized::External(wrapped) => {
                    outcomes[i] = Some(GetOrCreateOutcome::External(wrapped));
                }
                Normalized::Internal(canonical) => {
                    let existing = normalize::resource_url_alternatives(&canonical)
                        .into_iter()
                        .find_map(|c| self.lookup_url(&c));
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
            let ids = persist_many(&to_persist_urls)?;
            if ids.len() != to_persist_urls.len() {
                return Err(CrystalError::Io(
                    "bulk persist returned a mismatched number of ids".to_string(),
                ));
            }
            for ((idx, url), id) in to_persist_indices.into_iter().zip(to_persist_urls).zip(ids) {
                self.insert_known(Resource { id, url });
                outcomes[idx] = Some(GetOrCreateOutcome::Resource { id, created: true });
            }
        }

        Ok(outcomes.into_iter().map(|o| o.unwrap()).collect())
    }

    /// Membership strategy 1 (spec.md §4.2): linear scan over the in-memory
    /// URL index, used when the whole project is known to fit in memory. The
    /// other two strategies (prefix range query, streaming cursor) need a
    /// database connection and live on `store::project::ProjectStore::{
    /// group_members_by_prefix, group_members_streaming}`; `ProjectStore::
    /// group_members` picks between all three per project/group size.
    pub fn group_members_in_memory(
        &self,
        group: &ResourceGroup,
    ) -> Result<Vec<ResourceId>, CrystalError> {
        let regex = pattern::compile_pattern(&group.url_pattern)?;
        let state = self.state.read();
        Ok(state
            .by_url
            .iter()
            .filter(|(url, _)| regex.is_match(url))
            .map(|(_, id)| *id)
            .collect())
    }

    pub fn group(&self, id: i64) -> Option<ResourceGroup> {
        self.state.read().groups.get(&id).cloned()
    }

    /// All registered groups flagged `do_not_download`, for the embed
    /// scheduling skip check (spec.md §4.4 step 6).
    pub fn do_not_download_groups(&self) -> Vec<ResourceGroup> {
        self.state
            .read()
            .groups
            .values()
            .filter(|g| g.do_not_download)
            .cloned()
            .collect()
    }

    pub fn root_resource(&self, id: i64) -> Option<RootResource> {
        self.state.read().root_resources.get(&id).cloned()
    }

    /// Allocates the next negative, in-memory-only id for an unsaved
    /// Resource (spec.md §9 "negative id" design note).
    pub fn next_pending_id(&self) -> ResourceId {
        let mut state = self.state.write();
        let id = state.next_pending_id;
        state.next_pending_id -= 1;
        ResourceId(id)
    }
}
