//! Project Store (spec.md §4.1): durable on-disk format, sqlite metadata
//! database, revision body tree, and the open/migration/repair sequence.
//! Requires the `service` feature (sqlite + filesystem I/O).

pub mod db;
pub mod layout;
pub mod project;
pub mod revisions;
