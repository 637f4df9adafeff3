//! Task and revision event vocabulary.
//!
//! Mirrors spec.md §6.5's task listener contract. The scheduler posts
//! [`TaskEvent`]s to whatever sink the host registered at open time; the core
//! itself never blocks on a listener (posting is fire-and-forget over an
//! unbounded channel, same discipline as the teacher's `event_tx`).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::entity::resource::ResourceId;
use crate::error::ErrorKind;
use crate::scheduler::task::{TaskId, TaskKind};

/// Observed task lifecycle. Monotonic: a task never reverts to an earlier
/// state (spec.md §5 "Ordering guarantees").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    /// `on_task_added(parent_id, task_id, kind, title)`
    Added {
        parent_id: Option<TaskId>,
        task_id: TaskId,
        kind: TaskKind,
        title: String,
    },
    /// `on_task_progress(task_id, units_done, units_total?, eta?)`
    Progress {
        task_id: TaskId,
        units_done: u64,
        units_total: Option<u64>,
        eta_secs: Option<u64>,
    },
    /// `on_task_state(task_id, state, error?)`
    State {
        task_id: TaskId,
        state: TaskState,
        error: Option<ErrorKind>,
    },
    /// `on_task_removed(task_id)`
    Removed { task_id: TaskId },
}

/// Fired whenever a Revision is durably committed, so a host (or the serving
/// layer it owns) can invalidate caches without polling the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionCommitted {
    pub resource_id: ResourceId,
    pub revision_id: i64,
    pub is_error: bool,
}
