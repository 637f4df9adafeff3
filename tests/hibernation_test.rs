//! End-to-end scenario: hibernation & resume (spec.md §4.3). A host takes a
//! snapshot of in-flight top-level tasks, tears the scheduler down, then
//! resumes them against a fresh scheduler instance the way a process restart
//! would.

#![cfg(feature = "service")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crystal_core::entity::resource::ResourceId;
use crystal_core::error::CrystalError;
use crystal_core::event::{TaskEvent, TaskState};
use crystal_core::scheduler::engine::{Scheduler, TaskExecutor, WorkItem};
use crystal_core::scheduler::task::TaskPriority;
use crystal_core::OpenOptions;

struct BlockingExecutor {
    release: tokio::sync::Notify,
    executed: AtomicUsize,
    seen: Mutex<Vec<ResourceId>>,
}

#[async_trait::async_trait]
impl TaskExecutor for BlockingExecutor {
    async fn execute(&self, item: WorkItem) -> Result<(), CrystalError> {
        self.release.notified().await;
        if let Some(id) = resource_id_of(&item) {
            self.seen.lock().unwrap().push(id);
        }
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn host_of(&self, _payload: &crystal_core::scheduler::task::TaskPayload) -> Option<String> {
        None
    }

    fn is_page_fetch(&self, _payload: &crystal_core::scheduler::task::TaskPayload) -> bool {
        false
    }
}

fn resource_id_of(item: &WorkItem) -> Option<ResourceId> {
    match &item.payload {
        crystal_core::scheduler::task::TaskPayload::DownloadResource { resource_id, .. } => {
            Some(*resource_id)
        }
        _ => None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn a_hibernated_snapshot_resumes_against_a_fresh_scheduler() {
    use crystal_core::scheduler::task::TaskPayload;

    let executor = Arc::new(BlockingExecutor {
        release: tokio::sync::Notify::new(),
        executed: AtomicUsize::new(0),
        seen: Mutex::new(Vec::new()),
    });
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TaskEvent>();
    let scheduler = Scheduler::spawn(executor.clone(), event_tx, OpenOptions::default());
    let handle = scheduler.handle();
    let root = crystal_core::scheduler::task::TaskId(1);

    // Enqueue a task that never runs to completion (the executor blocks on a
    // Notify it never gets in this half of the test).
    handle
        .enqueue(
            root,
            "stuck-page",
            TaskPayload::DownloadResource {
                resource_id: ResourceId(42),
                stale_before: None,
            },
            TaskPriority::Background,
            false,
        )
        .unwrap();

    // Wait for the Running state so the snapshot sees a real in-flight task.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), event_rx.recv()).await {
            Ok(Some(TaskEvent::State { state: TaskState::Running, .. })) => break,
            Ok(Some(_)) => continue,
            _ => panic!("task never started running"),
        }
    }

    let snapshot = handle.hibernation_snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].title, "stuck-page");

    drop(scheduler); // tears down the old scheduler thread, cancelling the stuck task

    // Resume the snapshot against a brand-new scheduler/executor pair.
    let executor2 = Arc::new(BlockingExecutor {
        release: tokio::sync::Notify::new(),
        executed: AtomicUsize::new(0),
        seen: Mutex::new(Vec::new()),
    });
    let (event_tx2, mut event_rx2) = mpsc::unbounded_channel::<TaskEvent>();
    let scheduler2 = Scheduler::spawn(executor2.clone(), event_tx2, OpenOptions::default());
    let handle2 = scheduler2.handle();

    handle2.resume_hibernated(snapshot).unwrap();
    executor2.release.notify_one();

    loop {
        match tokio::time::timeout(Duration::from_secs(5), event_rx2.recv()).await {
            Ok(Some(TaskEvent::State { state: TaskState::Completed, .. })) => break,
            Ok(Some(_)) => continue,
            _ => panic!("resumed task never completed"),
        }
    }

    assert_eq!(executor2.executed.load(Ordering::SeqCst), 1);
    assert_eq!(executor2.seen.lock().unwrap().as_slice(), &[ResourceId(42)]);
}
