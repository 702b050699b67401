//! Core data model.
//!
//! A task is a unit of work owned by a workflow. It has identity, a target
//! queue, a lifecycle state, and dependency relations to other tasks in the
//! same workflow. Relations are identity sets, never object references:
//! the workflow's task map is the arena, edges are ids into it. This keeps
//! the graph serializable and cycle-safe at the ownership level.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Newtype for workflow IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

/// Newtype for queue IDs. `Ord` matters: multi-queue lock acquisition is
/// done in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(pub Uuid);

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Short display: first 8 chars of UUID
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }
    };
}

impl_id!(WorkflowId);
impl_id!(QueueId);
impl_id!(TaskId);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on one or more uncompleted prerequisites.
    AwaitDependence,
    /// Dependency-free; in (or eligible for) a queue's ready sequence.
    Queued,
    /// Checked out by a queue worker.
    Running,
    /// Done successfully. Terminal.
    Completed,
    /// Execution failed. Terminal; reachable but no operation produces it.
    Failed,
}

impl TaskState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Queued, AwaitDependence)             // dependency added before start
                | (AwaitDependence, AwaitDependence) // further edges while waiting
                | (AwaitDependence, Queued)       // last outstanding prerequisite done
                | (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Dependencies may only be added before the task starts executing.
    pub fn accepts_dependencies(self) -> bool {
        matches!(self, TaskState::AwaitDependence | TaskState::Queued)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::AwaitDependence => "await_dependence",
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work tracked inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,

    /// The queue this task is dispatched through.
    pub queue_id: QueueId,

    /// Unique within the owning workflow, not globally.
    pub name: String,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Prerequisites: tasks this task depends on.
    pub depends_on: HashSet<TaskId>,

    /// Tasks that depend on this task, in declaration order. Completion
    /// fans out to these.
    pub dependents: Vec<TaskId>,

    /// The subset of `depends_on` not yet completed. Emptiness gates
    /// eligibility for dispatch.
    pub outstanding: HashSet<TaskId>,
}

impl Task {
    pub(crate) fn new(name: impl Into<String>, queue_id: QueueId) -> Self {
        Self {
            id: TaskId::new(),
            queue_id,
            name: name.into(),
            state: TaskState::Queued,
            depends_on: HashSet::new(),
            dependents: Vec::new(),
            outstanding: HashSet::new(),
        }
    }

    /// Apply a validated state transition. Returns the previous state.
    pub(crate) fn transition(&mut self, to: TaskState) -> Result<TaskState> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        self.state = to;
        Ok(from)
    }
}

// ---------------------------------------------------------------------------
// QueueTask
// ---------------------------------------------------------------------------

/// Reference to dispatched work, as returned by peek/dequeue.
///
/// Names only; internal identities never cross the API boundary. Workers
/// hand the same pair back to `complete_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTask {
    pub workflow: String,
    pub task: String,
}
