//! Sqlite connection pool, schema, and schema migrations (spec.md §6.2).
//!
//! Migrations are a hand-rolled `Migration`/`MigrationList` feeding sqlx's
//! `Migrator`/`MigrationSource`, the same shape the teacher's `db_init` uses
//! — not the `sqlx::migrate!` macro's file-discovery, since Crystal's only
//! real migration (major_version 1→2) is a filesystem operation interleaved
//! with a single schema UPDATE, not a sequence of `.sql` files.

use std::path::Path;
use std::str::FromStr;

use futures_core::future::BoxFuture;
use sqlx::{
    error::BoxDynError,
    migrate::{MigrateDatabase, Migration as SqlxMigration, MigrationSource, MigrationType, Migrator},
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
    Pool,
};

use crate::error::CrystalError;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
    pub kind: MigrationType,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            let mut migrations = Vec::new();
            for migration in self.0 {
                if matches!(migration.kind, MigrationType::ReversibleUp) {
                    migrations.push(SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        migration.kind,
                        migration.sql.into(),
                        false,
                    ));
                }
            }
            Ok(migrations)
        })
    }
}

/// spec.md §6.2, the full schema as of schema version 1. `error` and
/// `metadata` are stored as JSON text; `error="null"` means success.
const SCHEMA_V1: &str = "\
CREATE TABLE project_property (name TEXT PRIMARY KEY, value TEXT NOT NULL);
CREATE TABLE resource (id INTEGER PRIMARY KEY, url TEXT NOT NULL UNIQUE);
CREATE TABLE root_resource (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    resource_id INTEGER NOT NULL UNIQUE REFERENCES resource(id)
);
CREATE TABLE resource_group (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    url_pattern TEXT NOT NULL,
    source_type TEXT,
    source_id INTEGER,
    do_not_download INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE alias (
    id INTEGER PRIMARY KEY,
    source_url_prefix TEXT NOT NULL UNIQUE,
    target_url_prefix TEXT NOT NULL,
    target_is_external INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE resource_revision (
    id INTEGER PRIMARY KEY,
    resource_id INTEGER NOT NULL REFERENCES resource(id),
    request_cookie TEXT,
    error TEXT NOT NULL DEFAULT 'null',
    metadata TEXT NOT NULL
);
CREATE INDEX idx_resource_revision_resource_id ON resource_revision(resource_id);
CREATE INDEX idx_resource_revision_error ON resource_revision(resource_id) WHERE error != 'null';
CREATE INDEX idx_resource_revision_cookie ON resource_revision(resource_id) WHERE request_cookie IS NOT NULL;
CREATE INDEX idx_resource_revision_status ON resource_revision(json_extract(metadata, '$.status_code'));
";

async fn db_init_with_schema(
    db_path: &Path,
    read_only: bool,
    schema: &'static str,
) -> Result<Pool<Sqlite>, sqlx::Error> {
    let fqdb = format!("sqlite:{}", db_path.to_str().ok_or(sqlx::Error::Configuration(
        "project path is not valid UTF-8".into(),
    ))?);
    tracing::debug!(%fqdb, "opening project database");

    if !read_only && !Sqlite::database_exists(&fqdb).await.unwrap_or(false) {
        Sqlite::create_database(&fqdb).await?;
    }

    let options = SqliteConnectOptions::from_str(&fqdb)?
        .read_only(read_only)
        .create_if_missing(!read_only)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    if !read_only {
        // WAL per spec.md §4.1 open-sequence step 2 ("If writable, enable
        // write-ahead logging").
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;

        let migrations = MigrationList(vec![Migration {
            version: 1,
            description: "create_initial_tables",
            sql: schema,
            kind: MigrationType::ReversibleUp,
        }]);
        let migrator = Migrator::new(migrations).await?;
        migrator.run(&pool).await?;
    }

    Ok(pool)
}

/// Opens (creating if absent) the project's sqlite database and runs schema
/// migrations when writable.
pub async fn db_init(db_path: &Path, read_only: bool) -> Result<Pool<Sqlite>, CrystalError> {
    db_init_with_schema(db_path, read_only, SCHEMA_V1)
        .await
        .map_err(CrystalError::from)
}
