//! End-to-end scenario: a page that embeds a link to itself must resolve to
//! exactly one DownloadResource execution, not an infinite recursion (spec.md
//! §8 scenario 6). The scheduler's admission set (spec.md §4.3 "not already
//! downloading this session") is what's actually under test here; a fake
//! executor stands in for the download pipeline and re-enqueues the same
//! resource id the way `DownloadPipeline::parse_and_schedule_embeds` would
//! for a self-referencing `<a href>`.

#![cfg(feature = "service")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;

use crystal_core::entity::resource::ResourceId;
use crystal_core::error::CrystalError;
use crystal_core::event::{TaskEvent, TaskState};
use crystal_core::scheduler::engine::{Scheduler, SchedulerHandle, TaskExecutor, WorkItem};
use crystal_core::scheduler::task::{TaskId, TaskPayload, TaskPriority};
use crystal_core::OpenOptions;

struct SelfLinkingExecutor {
    handle: OnceLock<SchedulerHandle>,
    executions: AtomicUsize,
}

impl SelfLinkingExecutor {
    fn attach(&self, handle: SchedulerHandle) {
        let _ = self.handle.set(handle);
    }
}

#[async_trait::async_trait]
impl TaskExecutor for SelfLinkingExecutor {
    async fn execute(&self, item: WorkItem) -> Result<(), CrystalError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let TaskPayload::DownloadResource { resource_id, .. } = item.payload {
            // Simulate discovering the same URL as an embedded link on its
            // own page and re-enqueuing it as the pipeline would.
            self.handle.get().unwrap().enqueue(
                item.task_id,
                "self-embed",
                TaskPayload::DownloadResource {
                    resource_id,
                    stale_before: None,
                },
                TaskPriority::Background,
                false,
            )?;
        }
        Ok(())
    }

    fn host_of(&self, _payload: &TaskPayload) -> Option<String> {
        Some("example.com".to_string())
    }

    fn is_page_fetch(&self, payload: &TaskPayload) -> bool {
        matches!(payload, TaskPayload::DownloadResource { .. })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn self_embedded_link_executes_exactly_once() {
    let executor = Arc::new(SelfLinkingExecutor {
        handle: OnceLock::new(),
        executions: AtomicUsize::new(0),
    });
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TaskEvent>();
    let scheduler = Scheduler::spawn(executor.clone(), event_tx, OpenOptions::default());
    executor.attach(scheduler.handle());

    let root = TaskId(1);
    scheduler
        .handle()
        .enqueue(
            root,
            "self-page",
            TaskPayload::DownloadResource {
                resource_id: ResourceId(7),
                stale_before: None,
            },
            TaskPriority::Background,
            false,
        )
        .unwrap();

    // Wait for the single execution's completion; a second, wrongly-admitted
    // execution would show up as a second Completed event within the window.
    let mut completed = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(500), event_rx.recv()).await {
            Ok(Some(TaskEvent::State { state: TaskState::Completed, .. })) => {
                completed += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => break, // no more events within the window: the cycle is over
        }
    }

    assert_eq!(completed, 1, "self-embedded resource must complete exactly once");
    assert_eq!(
        executor.executions.load(Ordering::SeqCst),
        1,
        "the duplicate re-enqueue of the same resource id must never reach execute()"
    );
}
