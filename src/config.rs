//! Configuration passed into a project at open time.
//!
//! Per the "no process-wide caches" design note (spec.md §9), the cookie
//! store, the parser registry, and the idle-sleep hook are all configuration
//! values handed to [`crate::store::project::ProjectStore::open`] rather than
//! globals — the project handle is the only long-lived mutable state. This
//! mirrors the teacher's `LatticeConfigProvider` being an injected `Arc<dyn
//! Trait>` rather than a `static`.

use std::time::Duration;

/// Hook a host implements to inhibit OS idle-sleep while tasks are running
/// (spec.md §5 "Idle-sleep suppression"). The library ships a no-op default.
pub trait IdleSleepGuard: Send + Sync {
    fn inhibit(&self) {}
    fn release(&self) {}
}

#[derive(Default)]
pub struct NoopIdleSleepGuard;

impl IdleSleepGuard for NoopIdleSleepGuard {}

/// Tunables for a single project open. Defaults match the values spec.md
/// states explicitly (politeness delay 1s, 4 concurrent fetches, 2 items/sec
/// cap, 100-item backpressure window).
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Force read-only even if the project would otherwise open writable.
    pub force_read_only: bool,
    /// Minimum wall-clock interval between successive HTML page completions.
    pub politeness_delay: Duration,
    /// Maximum aggregate completions per second across the whole project.
    pub max_rate_per_sec: f64,
    /// Upper bound on concurrent network fetches that do not touch the
    /// database (spec.md §4.3 "Concurrency contract").
    pub max_concurrent_fetches: usize,
    /// Cap on DownloadResource children materialized at once under a
    /// DownloadGroup (spec.md §4.3 "Backpressure").
    pub group_batch_size: usize,
    /// Minutes a Default Revision is considered "session fresh" before a
    /// redownload is attempted (spec.md §4.4 step 1).
    pub session_fresh_minutes: i64,
    /// Feature-flags the "assume-fresh-this-session" optimization per
    /// spec.md §9's third Open Question; default true, matching the spec's
    /// description of current behavior.
    pub assume_fresh_this_session: bool,
    /// Timeout to first byte of a response.
    pub connect_timeout: Duration,
    /// Abort the transfer if no bytes arrive for this long mid-body.
    pub stall_timeout: Duration,
    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            force_read_only: false,
            politeness_delay: Duration::from_secs(1),
            max_rate_per_sec: 2.0,
            max_concurrent_fetches: 4,
            group_batch_size: 100,
            session_fresh_minutes: 60,
            assume_fresh_this_session: true,
            connect_timeout: Duration::from_secs(10),
            stall_timeout: Duration::from_secs(30),
            user_agent: "Crystal/1.0 (+https://example.invalid/crystal)".to_string(),
        }
    }
}
