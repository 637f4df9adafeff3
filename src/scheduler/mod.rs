//! Task Scheduler (spec.md §4.3): hierarchical task tree, dedicated
//! scheduler thread, politeness delay, priority, cancellation,
//! hibernation/resume.
//!
//! `task` and `politeness` are pure/no-I/O and compile under the default
//! feature set (the event vocabulary in `crate::event` names `TaskId`
//! /`TaskKind` unconditionally); `engine` drives the actual scheduler thread
//! and worker pool and needs `service` (dashmap, tokio-util, async-trait).

#[cfg(feature = "service")]
pub mod engine;
pub mod politeness;
pub mod task;
