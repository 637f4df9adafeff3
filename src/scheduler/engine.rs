//! Scheduler thread and worker pool (spec.md §4.3).
//!
//! The scheduler thread is a dedicated single-threaded `tokio::runtime::Runtime`
//! (`Builder::new_current_thread`), the same way the teacher's `WatchService`
//! dedicates a runtime to the compiler/transaction loop in `watch.rs`. Leaf
//! work (HTTP fetch, parse) is dispatched onto a bounded pool of tasks on the
//! caller's ambient multi-thread runtime, mirroring the manager/worker split
//! the retrieved `gglib` download-manager file uses for concurrent jobs:
//! cloned `Arc` deps, one `tokio_util::sync::CancellationToken` per job,
//! progress reported back over a channel rather than shared mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::OpenOptions;
use crate::entity::resource::ResourceId;
use crate::error::CrystalError;
use crate::event::{TaskEvent, TaskState};
use crate::scheduler::politeness::PolitenessGate;
use crate::scheduler::task::{ChildResolution, TaskId, TaskNode, TaskPayload, TaskPriority, TaskTree};

/// What the scheduler asks a leaf worker to do. Mirrors `DownloadJob` in the
/// retrieved `gglib` corpus file: a small value describing the work plus the
/// resources (cancellation token, semaphore permit) the worker needs.
pub struct WorkItem {
    pub task_id: TaskId,
    pub payload: TaskPayload,
    pub cancel: CancellationToken,
}

/// Leaf work a host wires in: actually fetching a body, parsing links, or
/// refreshing group membership. Kept as an injected trait object so
/// `scheduler::engine` does not depend on `download`/`parser` directly —
/// the same decoupling the teacher keeps between `WatchService` and the
/// codec/db layers it is handed at construction.
#[async_trait::async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, item: WorkItem) -> Result<(), CrystalError>;
    /// Host for politeness accounting (spec.md §4.3); `None` for work that
    /// isn't a page fetch (e.g. ParseLinks).
    fn host_of(&self, payload: &TaskPayload) -> Option<String>;
    /// Whether this payload represents an HTML page fetch and so consumes a
    /// politeness delay slot (spec.md §4.3: embeds do not).
    fn is_page_fetch(&self, payload: &TaskPayload) -> bool;

    /// Notifies the executor that `child_payload`, a child of `parent_payload`,
    /// has resolved (completed, failed, or cancelled). DownloadGroup's
    /// restartable batch window (spec.md §4.3 "Backpressure") uses this to
    /// refill one slot per completion instead of materializing every member
    /// up front. Default no-op for payloads that don't need it.
    async fn on_child_resolved(
        &self,
        _parent_task: TaskId,
        _parent_payload: &TaskPayload,
        _child_payload: &TaskPayload,
    ) {
    }
}

pub enum SchedulerCommand {
    Enqueue {
        parent: TaskId,
        title: String,
        payload: TaskPayload,
        priority: TaskPriority,
        required_by_parent: bool,
    },
    Cancel(TaskId),
    /// spec.md §4.3 "Hibernation & resume": capture every in-flight top-level
    /// DownloadResource/DownloadGroup task so a host can persist it.
    Snapshot(oneshot::Sender<Vec<TaskNode>>),
    /// Re-enqueues a previously hibernated snapshot as fresh children of the
    /// root task. Original task ids are not preserved — a resumed task gets a
    /// new id the same way any other `Enqueue` does.
    Resume(Vec<TaskNode>),
    Shutdown,
}

struct WorkerSlot {
    cancel: CancellationToken,
}

/// Handle a foreground thread holds to post commands onto the scheduler
/// thread (spec.md §4.3 "Model": "may request operations... by posting
/// messages onto the scheduler thread").
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn post(&self, command: SchedulerCommand) -> Result<(), CrystalError> {
        self.command_tx.send(command)?;
        Ok(())
    }

    pub fn enqueue(
        &self,
        parent: TaskId,
        title: impl Into<String>,
        payload: TaskPayload,
        priority: TaskPriority,
        required_by_parent: bool,
    ) -> Result<(), CrystalError> {
        self.post(SchedulerCommand::Enqueue {
            parent,
            title: title.into(),
            payload,
            priority,
            required_by_parent,
        })
    }

    pub fn cancel(&self, task_id: TaskId) -> Result<(), CrystalError> {
        self.post(SchedulerCommand::Cancel(task_id))
    }

    /// spec.md §4.3 "Hibernation & resume" step 1: capture the in-flight
    /// top-level task set so a host can persist it (e.g. into the
    /// `hibernated_tasks` project property) before shutting down.
    pub async fn hibernation_snapshot(&self) -> Result<Vec<crate::scheduler::task::TaskNode>, CrystalError> {
        let (tx, rx) = oneshot::channel();
        self.post(SchedulerCommand::Snapshot(tx))?;
        rx.await
            .map_err(|_| CrystalError::Io("scheduler thread dropped the snapshot reply".to_string()))
    }

    /// spec.md §4.3 "Hibernation & resume" step 2: re-enqueue a previously
    /// persisted snapshot as new children of the root task.
    pub fn resume_hibernated(&self, tasks: Vec<crate::scheduler::task::TaskNode>) -> Result<(), CrystalError> {
        self.post(SchedulerCommand::Resume(tasks))
    }

    pub fn shutdown(&self) -> Result<(), CrystalError> {
        self.post(SchedulerCommand::Shutdown)
    }
}

/// Owns the dedicated scheduler thread. Dropping this joins the thread.
pub struct Scheduler {
    thread: Option<std::thread::JoinHandle<()>>,
    handle: SchedulerHandle,
}

impl Scheduler {
    pub fn spawn(
        executor: Arc<dyn TaskExecutor>,
        event_tx: mpsc::UnboundedSender<TaskEvent>,
        options: OpenOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("crystal-scheduler".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to start scheduler runtime");
                runtime.block_on(run_loop(command_rx, event_tx, executor, options));
            })
            .expect("failed to spawn scheduler thread");

        Scheduler {
            thread: Some(thread),
            handle: SchedulerHandle { command_tx },
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn run_loop(
    mut command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
    executor: Arc<dyn TaskExecutor>,
    options: OpenOptions,
) {
    let mut tree = TaskTree::new();
    let root = tree.root.expect("TaskTree always has a root");
    // spec.md §4.3 "Admission dedup (not already downloading this session)",
    // grounded on the `dashmap::DashSet` concurrent work-tracking map the
    // retrieved `gawsh` corpus repo uses.
    let admission: Arc<DashSet<ResourceId>> = Arc::new(DashSet::new());
    let fetch_permits = Arc::new(Semaphore::new(options.max_concurrent_fetches.max(1)));
    let mut politeness = PolitenessGate::new(options.politeness_delay, options.max_rate_per_sec);
    let mut slots: HashMap<TaskId, WorkerSlot> = HashMap::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(TaskId, Result<(), CrystalError>)>();

    loop {
        tokio::select! {
            maybe_cmd = command_rx.recv() => {
                match maybe_cmd {
                    None | Some(SchedulerCommand::Shutdown) => break,
                    Some(SchedulerCommand::Enqueue { parent, title, payload, priority, required_by_parent }) => {
                        if let TaskPayload::DownloadResourceBody { resource_id, .. }
                        | TaskPayload::DownloadResource { resource_id, .. } = &payload {
                            if !admission.insert(*resource_id) {
                                debug!(?resource_id, "skipping duplicate admission this session");
                                continue;
                            }
                        }
                        let task_id = tree.add_child(parent, title.clone(), payload.clone(), priority, required_by_parent);
                        let _ = event_tx.send(TaskEvent::Added {
                            parent_id: Some(parent),
                            task_id,
                            kind: payload.kind(),
                            title,
                        });
                        spawn_worker(
                            task_id, payload, priority, &executor, &mut slots, &mut politeness,
                            fetch_permits.clone(), done_tx.clone(), &event_tx,
                        );
                    }
                    Some(SchedulerCommand::Cancel(task_id)) => {
                        tree.cancel_subtree(task_id);
                        if let Some(slot) = slots.remove(&task_id) {
                            slot.cancel.cancel();
                        }
                        let _ = event_tx.send(TaskEvent::State {
                            task_id,
                            state: TaskState::Cancelled,
                            error: None,
                        });
                    }
                    Some(SchedulerCommand::Snapshot(reply)) => {
                        let _ = reply.send(tree.hibernation_snapshot());
                    }
                    Some(SchedulerCommand::Resume(tasks)) => {
                        for node in tasks {
                            if let TaskPayload::DownloadResourceBody { resource_id, .. }
                            | TaskPayload::DownloadResource { resource_id, .. } = &node.payload {
                                if !admission.insert(*resource_id) {
                                    debug!(?resource_id, "skipping duplicate admission on resume");
                                    continue;
                                }
                            }
                            let task_id = tree.add_child(
                                root, node.title.clone(), node.payload.clone(), node.priority, node.required_by_parent,
                            );
                            let _ = event_tx.send(TaskEvent::Added {
                                parent_id: Some(root),
                                task_id,
                                kind: node.payload.kind(),
                                title: node.title,
                            });
                            spawn_worker(
                                task_id, node.payload, node.priority, &executor, &mut slots, &mut politeness,
                                fetch_permits.clone(), done_tx.clone(), &event_tx,
                            );
                        }
                    }
                }
            }
            Some((task_id, result)) = done_rx.recv() => {
                slots.remove(&task_id);
                let state = match &result {
                    Ok(()) => TaskState::Completed,
                    Err(_) => TaskState::Failed,
                };
                if state == TaskState::Completed {
                    if let Some(node) = tree.get(task_id) {
                        if executor.is_page_fetch(&node.payload) {
                            if let Some(host) = executor.host_of(&node.payload) {
                                politeness.record_completion(&host, tokio::time::Instant::now());
                            }
                        }
                    }
                }
                let child_payload = tree.get(task_id).map(|n| n.payload.clone());
                if let Some(parent) = tree.set_state(task_id, state) {
                    let _ = event_tx.send(TaskEvent::State {
                        task_id,
                        state,
                        error: result.err().map(|e| e.kind()),
                    });
                    if let (Some(parent_node), Some(child_payload)) =
                        (tree.get(parent), &child_payload)
                    {
                        let parent_payload = parent_node.payload.clone();
                        executor
                            .on_child_resolved(parent, &parent_payload, child_payload)
                            .await;
                    }
                    match tree.child_resolution(parent) {
                        ChildResolution::ParentShouldComplete => {
                            tree.set_state(parent, TaskState::Completed);
                        }
                        ChildResolution::ParentShouldFail => {
                            tree.set_state(parent, TaskState::Failed);
                        }
                        ChildResolution::Pending => {}
                    }
                }
                tree.prune_completed_roots();
            }
        }
    }

    for (_, slot) in slots.drain() {
        slot.cancel.cancel();
    }
    warn!("scheduler thread shutting down");
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker(
    task_id: TaskId,
    payload: TaskPayload,
    priority: TaskPriority,
    executor: &Arc<dyn TaskExecutor>,
    slots: &mut HashMap<TaskId, WorkerSlot>,
    politeness: &mut PolitenessGate,
    fetch_permits: Arc<Semaphore>,
    done_tx: mpsc::UnboundedSender<(TaskId, Result<(), CrystalError>)>,
    event_tx: &mpsc::UnboundedSender<TaskEvent>,
) {
    let cancel = CancellationToken::new();
    slots.insert(task_id, WorkerSlot { cancel: cancel.clone() });
    let _ = event_tx.send(TaskEvent::State {
        task_id,
        state: TaskState::Running,
        error: None,
    });

    let executor = executor.clone();
    let is_page = executor.is_page_fetch(&payload);
    let host = executor.host_of(&payload);
    // spec.md §4.3 "Priorities": Interactive work (a user-initiated download,
    // or a browser request for an undownloaded URL) bypasses the politeness
    // delay entirely; only Background page fetches wait on the gate.
    let delay = if is_page && priority != TaskPriority::Interactive {
        host.map(|h| politeness.wait_before_next(&h, tokio::time::Instant::now()))
    } else {
        None
    };

    tokio::spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let _permit = fetch_permits.acquire_owned().await;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CrystalError::Cancelled),
            r = executor.execute(WorkItem { task_id, payload, cancel: cancel.clone() }) => r,
        };
        let _ = done_tx.send((task_id, result));
    });
}
