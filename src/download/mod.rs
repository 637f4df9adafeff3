//! HTTP fetch and the per-resource download pipeline (spec.md §4.4).
//! Requires the `service` feature (network I/O, sqlite-backed persistence).

pub mod http;
pub mod pipeline;

pub use pipeline::DownloadPipeline;
