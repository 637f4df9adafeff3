use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The abstract error kinds spec.md §7 names. A host's serving layer can
/// match on this without knowing about every concrete variant below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ProjectTooNew,
    ProjectReadOnly,
    DiskFull,
    RevisionBodyMissing,
    DownloadTimeout,
    DownloadNetwork,
    DownloadTls,
    DownloadHttp,
    ParseFailed,
    Cancelled,
    AlreadyExists,
    NotFound,
    InvalidUrlPattern,
    Io,
    Serialization,
}

#[derive(Debug, Error)]
pub enum CrystalError {
    #[error("project at {path} is not a .crystalproj directory: {reason}")]
    InvalidProjectDirectory { path: String, reason: String },

    #[error("project major_version {found} is newer than the latest supported version {latest}")]
    ProjectTooNew { found: i64, latest: i64 },

    #[error("project is open read-only: {0}")]
    ProjectReadOnly(String),

    #[error("free disk space below the required threshold: {available} bytes free, {required} required")]
    DiskFull { available: u64, required: u64 },

    #[error("revision {0} has no body on disk")]
    RevisionBodyMissing(i64),

    #[error("download timed out: {0}")]
    DownloadTimeout(String),

    #[error("network error during download: {0}")]
    DownloadNetwork(String),

    #[error("TLS error during download: {0}")]
    DownloadTls(String),

    #[error("HTTP error during download: {0}")]
    DownloadHttp(String),

    #[error("link parsing failed: {0}")]
    ParseFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid URL pattern: {0}")]
    InvalidUrlPattern(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("(de)serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),
}

impl CrystalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrystalError::InvalidProjectDirectory { .. } => ErrorKind::NotFound,
            CrystalError::ProjectTooNew { .. } => ErrorKind::ProjectTooNew,
            CrystalError::ProjectReadOnly(_) => ErrorKind::ProjectReadOnly,
            CrystalError::DiskFull { .. } => ErrorKind::DiskFull,
            CrystalError::RevisionBodyMissing(_) => ErrorKind::RevisionBodyMissing,
            CrystalError::DownloadTimeout(_) => ErrorKind::DownloadTimeout,
            CrystalError::DownloadNetwork(_) => ErrorKind::DownloadNetwork,
            CrystalError::DownloadTls(_) => ErrorKind::DownloadTls,
            CrystalError::DownloadHttp(_) => ErrorKind::DownloadHttp,
            CrystalError::ParseFailed(_) => ErrorKind::ParseFailed,
            CrystalError::Cancelled => ErrorKind::Cancelled,
            CrystalError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CrystalError::NotFound(_) => ErrorKind::NotFound,
            CrystalError::InvalidUrlPattern(_) => ErrorKind::InvalidUrlPattern,
            CrystalError::Io(_) => ErrorKind::Io,
            CrystalError::Serialization(_) => ErrorKind::Serialization,
            CrystalError::Database(_) => ErrorKind::Io,
        }
    }
}

impl From<io::Error> for CrystalError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => CrystalError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => {
                CrystalError::ProjectReadOnly(format!("permission denied: {x}"))
            }
            _ => CrystalError::Io(format!("{x}")),
        }
    }
}

impl From<serde_json::Error> for CrystalError {
    fn from(x: serde_json::Error) -> Self {
        CrystalError::Serialization(format!("JSON error: {x}"))
    }
}

impl From<toml::de::Error> for CrystalError {
    fn from(x: toml::de::Error) -> Self {
        CrystalError::Serialization(format!("TOML deserialization error: {x}"))
    }
}

impl From<toml::ser::Error> for CrystalError {
    fn from(x: toml::ser::Error) -> Self {
        CrystalError::Serialization(format!("TOML serialization error: {x}"))
    }
}

impl From<url::ParseError> for CrystalError {
    fn from(x: url::ParseError) -> Self {
        CrystalError::InvalidUrlPattern(format!("{x}"))
    }
}

impl From<regex::Error> for CrystalError {
    fn from(x: regex::Error) -> Self {
        CrystalError::InvalidUrlPattern(format!("pattern did not compile: {x}"))
    }
}

#[cfg(feature = "service")]
impl From<sqlx::Error> for CrystalError {
    fn from(x: sqlx::Error) -> Self {
        CrystalError::Database(format!("{x}"))
    }
}

#[cfg(feature = "service")]
impl From<reqwest::Error> for CrystalError {
    fn from(x: reqwest::Error) -> Self {
        if x.is_timeout() {
            CrystalError::DownloadTimeout(format!("{x}"))
        } else if x.is_connect() {
            CrystalError::DownloadNetwork(format!("{x}"))
        } else {
            CrystalError::DownloadHttp(format!("{x}"))
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CrystalError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CrystalError::Io("scheduler channel closed: receiver dropped".to_string())
    }
}
