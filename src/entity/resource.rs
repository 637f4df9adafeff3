//! Core entity types (spec.md §3.1): Resource, Revision, Root Resource,
//! Resource Group, Alias, Project Properties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Resource id. Positive ids are durable (assigned by the Project Store);
/// negative ids are the "pending save" in-memory-only space spec.md §9
/// describes for readonly/unsaved Resources, so a caller can never mistake
/// one for a persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub i64);

impl ResourceId {
    pub fn is_pending(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A downloadable absolute URL (spec.md §3.1 "Resource").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub url: String,
}

/// A Revision id, monotonically increasing across the whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub i64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Abstract download error kinds a Revision can carry (spec.md §4.4 "Error
/// taxonomy per revision").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionError {
    Timeout { message: String },
    Dns { message: String },
    Tls { message: String },
    Connection { message: String },
    Http { message: String },
    Io { message: String },
}

impl RevisionError {
    pub fn message(&self) -> &str {
        match self {
            RevisionError::Timeout { message }
            | RevisionError::Dns { message }
            | RevisionError::Tls { message }
            | RevisionError::Connection { message }
            | RevisionError::Http { message }
            | RevisionError::Io { message } => message,
        }
    }
}

/// `{http_version, status_code, reason_phrase, headers}` (spec.md §6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// 10 or 11 (HTTP/1.0 or HTTP/1.1).
    pub http_version: u8,
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_error_status(&self) -> bool {
        self.status_code >= 400
    }
}

/// One concrete fetch of a Resource (spec.md §3.1 "Revision").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: RevisionId,
    pub resource_id: ResourceId,
    pub request_cookie: Option<String>,
    /// `None` is success; `Some` mirrors the JSON `error` column.
    pub error: Option<RevisionError>,
    /// Absent only when `error` is `Some` — every successful fetch has
    /// metadata even if the body was empty.
    pub metadata: Option<ResponseMetadata>,
    /// Whether a body file exists on disk for this revision (empty-body and
    /// error revisions have none, per spec.md §3.2).
    pub has_body: bool,
}

impl Revision {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A user-named anchor pointing at exactly one Resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootResource {
    pub id: i64,
    pub name: String,
    pub resource_id: ResourceId,
}

/// Where a Resource Group's pattern-matching traffic is seeded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupSource {
    RootResource(i64),
    Group(i64),
}

/// A named URL pattern with wildcards (spec.md §3.1 "Resource Group").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: i64,
    pub name: String,
    pub url_pattern: String,
    pub source: Option<GroupSource>,
    pub do_not_download: bool,
}

/// A URL rewrite rule (spec.md §3.1 "Alias").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: i64,
    /// Unique; must end in `/`.
    pub source_url_prefix: String,
    /// Must end in `/`.
    pub target_url_prefix: String,
    pub target_is_external: bool,
}

impl Alias {
    pub fn validate(&self) -> Result<(), crate::error::CrystalError> {
        if !self.source_url_prefix.ends_with('/') {
            return Err(crate::error::CrystalError::InvalidUrlPattern(format!(
                "alias source prefix must end in '/': {}",
                self.source_url_prefix
            )));
        }
        if !self.target_url_prefix.ends_with('/') {
            return Err(crate::error::CrystalError::InvalidUrlPattern(format!(
                "alias target prefix must end in '/': {}",
                self.target_url_prefix
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtmlParserType {
    Basic,
    Soup,
}

impl Default for HtmlParserType {
    fn default() -> Self {
        HtmlParserType::Basic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityTitleFormat {
    UrlName,
    NameUrl,
}

impl Default for EntityTitleFormat {
    fn default() -> Self {
        EntityTitleFormat::UrlName
    }
}

/// The small key/value table of project-wide settings (spec.md §3.1
/// "Project Properties").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProperties {
    pub major_version: i64,
    pub major_version_old: Option<i64>,
    pub default_url_prefix: Option<String>,
    pub html_parser_type: HtmlParserType,
    pub entity_title_format: EntityTitleFormat,
}

impl Default for ProjectProperties {
    fn default() -> Self {
        ProjectProperties {
            major_version: 1,
            major_version_old: None,
            default_url_prefix: None,
            html_parser_type: HtmlParserType::default(),
            entity_title_format: EntityTitleFormat::default(),
        }
    }
}

impl ProjectProperties {
    /// `major_version_old` absent means "no migration in progress" (spec.md
    /// §3.2).
    pub fn migration_in_progress(&self) -> bool {
        self.major_version_old.is_some()
    }
}
