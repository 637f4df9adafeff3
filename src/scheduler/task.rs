//! Task taxonomy and the tagged-variant tree (spec.md §4.3, §9 "Dynamic
//! dispatch on tasks": a uniform `step()`/`on_child_done()` protocol instead
//! of a trait-object hierarchy per task kind).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::resource::ResourceId;
use crate::event::TaskState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    DownloadResourceBody,
    DownloadResource,
    ParseLinks,
    UpdateGroupMembers,
    DownloadGroup,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    /// User clicked "Download", or a served browser requested an
    /// undownloaded URL: bypasses the politeness delay (spec.md §4.3
    /// "Priorities").
    Interactive,
    Background,
}

/// Kind-specific payload a task carries (spec.md §4.3 "Task taxonomy").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskPayload {
    DownloadResourceBody {
        resource_id: ResourceId,
        stale_before: Option<i64>,
    },
    DownloadResource {
        resource_id: ResourceId,
        stale_before: Option<i64>,
    },
    ParseLinks {
        revision_id: i64,
    },
    UpdateGroupMembers {
        group_id: i64,
    },
    DownloadGroup {
        group_id: i64,
    },
    Root,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::DownloadResourceBody { .. } => TaskKind::DownloadResourceBody,
            TaskPayload::DownloadResource { .. } => TaskKind::DownloadResource,
            TaskPayload::ParseLinks { .. } => TaskKind::ParseLinks,
            TaskPayload::UpdateGroupMembers { .. } => TaskKind::UpdateGroupMembers,
            TaskPayload::DownloadGroup { .. } => TaskKind::DownloadGroup,
            TaskPayload::Root => TaskKind::Root,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub parent: Option<TaskId>,
    pub title: String,
    pub payload: TaskPayload,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub children: Vec<TaskId>,
    /// Whether this task's failure should fail its parent (spec.md §7:
    /// "a failed subtask fails its parent iff the parent requires it").
    pub required_by_parent: bool,
}

impl TaskNode {
    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }
}

/// The per-project task tree. All structural mutation happens on the
/// scheduler thread (spec.md §4.3 "Model") — this type has no internal
/// locking because it is only ever touched from there.
#[derive(Default)]
pub struct TaskTree {
    nodes: HashMap<TaskId, TaskNode>,
    next_id: u64,
    pub root: Option<TaskId>,
}

impl TaskTree {
    pub fn new() -> Self {
        let mut tree = TaskTree {
            nodes: HashMap::new(),
            next_id: 1,
            root: None,
        };
        let root_id = tree.alloc_id();
        tree.nodes.insert(
            root_id,
            TaskNode {
                id: root_id,
                parent: None,
                title: "Root".to_string(),
                payload: TaskPayload::Root,
                priority: TaskPriority::Background,
                state: TaskState::Running,
                children: Vec::new(),
                required_by_parent: false,
            },
        );
        tree.root = Some(root_id);
        tree
    }

    fn alloc_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_child(
        &mut self,
        parent: TaskId,
        title: impl Into<String>,
        payload: TaskPayload,
        priority: TaskPriority,
        required_by_parent: bool,
    ) -> TaskId {
        let id = self.alloc_id();
        self.nodes.insert(
            id,
            TaskNode {
                id,
                parent: Some(parent),
                title: title.into(),
                payload,
                priority,
                state: TaskState::Pending,
                children: Vec::new(),
                required_by_parent,
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&id)
    }

    /// Marks `id`'s state and returns the parent id to notify via
    /// `on_child_done`, if all of the parent's required children have now
    /// resolved.
    pub fn set_state(&mut self, id: TaskId, state: TaskState) -> Option<TaskId> {
        let parent = self.nodes.get_mut(&id).and_then(|n| {
            n.state = state;
            n.parent
        })?;
        if matches!(state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled) {
            Some(parent)
        } else {
            None
        }
    }

    /// spec.md §7: "a failed subtask fails its parent iff the parent
    /// requires it." Call after a child resolves to see whether the parent
    /// should be (re)evaluated.
    pub fn child_resolution(&self, parent: TaskId) -> ChildResolution {
        let Some(parent_node) = self.nodes.get(&parent) else {
            return ChildResolution::Pending;
        };
        let mut all_done = true;
        let mut any_required_failed = false;
        for &child_id in &parent_node.children {
            let Some(child) = self.nodes.get(&child_id) else {
                continue;
            };
            match child.state {
                TaskState::Completed => {}
                TaskState::Failed | TaskState::Cancelled => {
                    if child.required_by_parent {
                        any_required_failed = true;
                    }
                }
                _ => all_done = false,
            }
        }
        if any_required_failed {
            ChildResolution::ParentShouldFail
        } else if all_done {
            ChildResolution::ParentShouldComplete
        } else {
            ChildResolution::Pending
        }
    }

    /// Marks `id` and every descendant cancelled (spec.md §4.3
    /// "Cancellation").
    pub fn cancel_subtree(&mut self, id: TaskId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&current) {
                node.state = TaskState::Cancelled;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    /// spec.md §4.3 "Completed-root pruning": drop completed top-level
    /// tasks so the tree does not grow unboundedly.
    pub fn prune_completed_roots(&mut self) {
        let Some(root) = self.root else { return };
        let completed: Vec<TaskId> = self
            .nodes
            .get(&root)
            .into_iter()
            .flat_map(|r| r.children.iter().copied())
            .filter(|id| {
                self.nodes
                    .get(id)
                    .map(|n| matches!(n.state, TaskState::Completed))
                    .unwrap_or(false)
            })
            .collect();
        for id in &completed {
            self.remove_subtree(*id);
        }
        if let Some(root_node) = self.nodes.get_mut(&root) {
            root_node.children.retain(|c| !completed.contains(c));
        }
    }

    fn remove_subtree(&mut self, id: TaskId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.remove_subtree(child);
            }
        }
    }

    /// spec.md §4.3 "Hibernation & resume": the set of in-flight top-level
    /// DownloadResource/DownloadGroup tasks, serialized for the
    /// `hibernated_tasks` project property.
    pub fn hibernation_snapshot(&self) -> Vec<TaskNode> {
        let Some(root) = self.root else { return Vec::new() };
        self.nodes
            .get(&root)
            .into_iter()
            .flat_map(|r| r.children.iter())
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| {
                matches!(n.kind(), TaskKind::DownloadResource | TaskKind::DownloadGroup)
                    && matches!(n.state, TaskState::Pending | TaskState::Running)
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildResolution {
    Pending,
    ParentShouldComplete,
    ParentShouldFail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_failure_propagates_only_when_required() {
        let mut tree = TaskTree::new();
        let root = tree.root.unwrap();
        let optional_child = tree.add_child(
            root,
            "embed",
            TaskPayload::DownloadResource {
                resource_id: ResourceId(2),
                stale_before: None,
            },
            TaskPriority::Background,
            false,
        );
        tree.set_state(optional_child, TaskState::Failed);
        assert_eq!(tree.child_resolution(root), ChildResolution::ParentShouldComplete);

        let required_child = tree.add_child(
            root,
            "body",
            TaskPayload::DownloadResourceBody {
                resource_id: ResourceId(3),
                stale_before: None,
            },
            TaskPriority::Background,
            true,
        );
        tree.set_state(required_child, TaskState::Failed);
        assert_eq!(tree.child_resolution(root), ChildResolution::ParentShouldFail);
    }

    #[test]
    fn cancel_subtree_marks_all_descendants() {
        let mut tree = TaskTree::new();
        let root = tree.root.unwrap();
        let parent = tree.add_child(
            root,
            "group",
            TaskPayload::DownloadGroup { group_id: 1 },
            TaskPriority::Background,
            false,
        );
        let child = tree.add_child(
            parent,
            "member",
            TaskPayload::DownloadResource {
                resource_id: ResourceId(1),
                stale_before: None,
            },
            TaskPriority::Background,
            false,
        );
        tree.cancel_subtree(parent);
        assert_eq!(tree.get(parent).unwrap().state, TaskState::Cancelled);
        assert_eq!(tree.get(child).unwrap().state, TaskState::Cancelled);
    }

    #[test]
    fn pruning_removes_completed_top_level_tasks() {
        let mut tree = TaskTree::new();
        let root = tree.root.unwrap();
        let task = tree.add_child(
            root,
            "body",
            TaskPayload::DownloadResourceBody {
                resource_id: ResourceId(1),
                stale_before: None,
            },
            TaskPriority::Background,
            false,
        );
        tree.set_state(task, TaskState::Completed);
        tree.prune_completed_roots();
        assert!(tree.get(task).is_none());
        assert!(tree.get(root).unwrap().children.is_empty());
    }
}
