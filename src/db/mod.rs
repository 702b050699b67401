//! Process-wide registry of workflows and queues, and the locks that keep
//! it consistent.
//!
//! Lock hierarchy, acquired strictly in this order (levels may be skipped,
//! never reordered):
//!
//! 1. workflows collection lock (the name/id maps)
//! 2. queues collection lock
//! 3. per-workflow entity lock
//! 4. per-queue entity lock(s), ascending [`QueueId`] order when several
//!    are needed at once
//!
//! Operations that discover their target queues only under a workflow
//! lock (resume, suspend, the completion cascade) take the queues
//! collection read lock *before* the workflow lock and hold it across the
//! cascade. Multi-queue write acquisition always goes through
//! [`QueueWriteSet`], which sorts targets by id first, so the ascending
//! rule is enforced in one place instead of by convention.
//!
//! Operations that mutate a workflow hold the workflows collection read
//! lock across the mutation, so a concurrent retirement (a collection
//! write) cannot remove the workflow mid-operation. The one exception is
//! `complete_task`, which must release everything before retiring; it is
//! safe because a workflow with a running task can never pass the
//! retirement completion re-check.

pub mod queue;
pub mod task;
pub mod workflow;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::event::EventLog;
use crate::model::{QueueId, Task, TaskId, WorkflowId};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A named collection of tasks with a shared suspend/active lifecycle.
pub struct Workflow {
    pub(crate) id: WorkflowId,
    pub(crate) name: String,
    pub(crate) inner: RwLock<WorkflowState>,
}

pub(crate) struct WorkflowState {
    /// True from creation until the first resume; task admission to
    /// queues is withheld while set.
    pub(crate) suspended: bool,
    /// The task arena. Edges between tasks are ids into this map.
    pub(crate) tasks: HashMap<TaskId, Task>,
    /// Task names, unique within the workflow.
    pub(crate) task_names: HashMap<String, TaskId>,
    /// Tasks that have reached `Completed`.
    pub(crate) completed: HashSet<TaskId>,
}

impl Workflow {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            inner: RwLock::new(WorkflowState {
                suspended: true,
                tasks: HashMap::new(),
                task_names: HashMap::new(),
                completed: HashSet::new(),
            }),
        }
    }
}

impl WorkflowState {
    pub(crate) fn task_id(&self, name: &str) -> Option<TaskId> {
        self.task_names.get(name).copied()
    }

    pub(crate) fn insert_task(&mut self, task: Task) {
        self.task_names.insert(task.name.clone(), task.id);
        self.tasks.insert(task.id, task);
    }

    /// All tasks fully completed? An empty workflow never retires.
    pub(crate) fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.completed.len() == self.tasks.len()
    }

    /// Is `to` reachable from `from` by following dependent edges?
    /// Used to reject cycle-closing dependency declarations.
    pub(crate) fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(task) = self.tasks.get(&id) {
                stack.extend(task.dependents.iter().copied());
            }
        }
        false
    }
}

/// A FIFO dispatch channel: ready task references plus the set of tasks
/// currently checked out for execution.
pub struct Queue {
    pub(crate) id: QueueId,
    pub(crate) name: String,
    pub(crate) inner: RwLock<QueueState>,
}

pub(crate) struct QueueState {
    /// (workflow, task) pairs in dispatch order.
    pub(crate) ready: VecDeque<(WorkflowId, TaskId)>,
    /// Dequeued but not yet completed.
    pub(crate) checked_out: HashSet<TaskId>,
}

impl Queue {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: QueueId::new(),
            name: name.into(),
            inner: RwLock::new(QueueState {
                ready: VecDeque::new(),
                checked_out: HashSet::new(),
            }),
        }
    }
}

impl QueueState {
    /// Withdraw a specific entry from the ready sequence, wherever it sits.
    pub(crate) fn withdraw(&mut self, workflow_id: WorkflowId, task_id: TaskId) {
        self.ready.retain(|entry| *entry != (workflow_id, task_id));
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// The workflow id/name map pair. Always mutated together, under the
/// collection write lock.
pub(crate) struct WorkflowMap {
    by_id: HashMap<WorkflowId, Arc<Workflow>>,
    by_name: HashMap<String, WorkflowId>,
}

impl WorkflowMap {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub(crate) fn get_by_name(&self, name: &str) -> Option<&Arc<Workflow>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub(crate) fn get_by_id(&self, id: WorkflowId) -> Option<&Arc<Workflow>> {
        self.by_id.get(&id)
    }

    fn insert(&mut self, workflow: Arc<Workflow>) {
        self.by_name.insert(workflow.name.clone(), workflow.id);
        self.by_id.insert(workflow.id, workflow);
    }

    fn remove(&mut self, id: WorkflowId) {
        if let Some(workflow) = self.by_id.remove(&id) {
            self.by_name.remove(&workflow.name);
        }
    }
}

/// The queue id/name map pair, same shape as [`WorkflowMap`].
pub(crate) struct QueueMap {
    by_id: HashMap<QueueId, Arc<Queue>>,
    by_name: HashMap<String, QueueId>,
}

impl QueueMap {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub(crate) fn get_by_name(&self, name: &str) -> Option<&Arc<Queue>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub(crate) fn get_by_id(&self, id: QueueId) -> Option<&Arc<Queue>> {
        self.by_id.get(&id)
    }

    fn insert(&mut self, queue: Arc<Queue>) {
        self.by_name.insert(queue.name.clone(), queue.id);
        self.by_id.insert(queue.id, queue);
    }

    fn remove(&mut self, id: QueueId) {
        if let Some(queue) = self.by_id.remove(&id) {
            self.by_name.remove(&queue.name);
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Process-wide registry mapping names to workflow and queue identities,
/// and holding the authoritative collections of both.
///
/// Explicitly constructed and explicitly passed; there is no implicit
/// default instance. Lives for as long as any workflow or queue must be
/// reachable.
pub struct Database {
    pub(crate) workflows: RwLock<WorkflowMap>,
    pub(crate) queues: RwLock<QueueMap>,
    pub(crate) events: EventLog,
}

impl Database {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(WorkflowMap::new()),
            queues: RwLock::new(QueueMap::new()),
            events: EventLog::new(),
        }
    }

    /// Resolve a workflow by name. Holds the collection read lock only for
    /// the lookup; the returned handle is independent of it.
    pub(crate) fn workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        self.workflows
            .read()
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| Error::workflow_not_found(name))
    }

    pub(crate) fn workflow_by_id(&self, id: WorkflowId) -> Option<Arc<Workflow>> {
        self.workflows.read().get_by_id(id).cloned()
    }

    /// Resolve a queue by name.
    pub(crate) fn queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queues
            .read()
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| Error::queue_not_found(name))
    }

    pub(crate) fn register_workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        let mut workflows = self.workflows.write();
        if workflows.contains_name(name) {
            return Err(Error::AlreadyExists(format!("workflow \"{name}\"")));
        }
        let workflow = Arc::new(Workflow::new(name));
        workflows.insert(workflow.clone());
        Ok(workflow)
    }

    pub(crate) fn register_queue(&self, name: &str) -> Result<Arc<Queue>> {
        let mut queues = self.queues.write();
        if queues.contains_name(name) {
            return Err(Error::AlreadyExists(format!("queue \"{name}\"")));
        }
        let queue = Arc::new(Queue::new(name));
        queues.insert(queue.clone());
        Ok(queue)
    }

    /// Remove a fully-completed workflow from the registry, freeing its
    /// name for reuse. Re-checks completion under `collection write →
    /// entity read` order, so a task added between the completing
    /// operation releasing its locks and this call keeps the workflow
    /// alive. Idempotent.
    pub(crate) fn retire_workflow(&self, workflow: &Arc<Workflow>) -> bool {
        let mut workflows = self.workflows.write();
        if workflows.get_by_id(workflow.id).is_none() {
            return false;
        }
        if !workflow.inner.read().is_complete() {
            return false;
        }
        workflows.remove(workflow.id);
        true
    }

    /// Events with a sequence number strictly greater than `seq`.
    pub fn events_since(&self, seq: u64) -> Vec<crate::event::Event> {
        self.events.since(seq)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Lock-ordering helpers
// ---------------------------------------------------------------------------

/// Sort and dedup queues into the canonical (ascending id) lock order.
pub(crate) fn lock_order(mut queues: Vec<Arc<Queue>>) -> Vec<Arc<Queue>> {
    queues.sort_by_key(|q| q.id);
    queues.dedup_by_key(|q| q.id);
    queues
}

/// Write locks over a set of queues, acquired in ascending identity order.
///
/// The only way multi-queue mutations take their locks; callers prepare
/// the slice with [`lock_order`] and release everything at once by
/// dropping the set (reverse acquisition order).
pub(crate) struct QueueWriteSet<'a> {
    queues: &'a [Arc<Queue>],
    guards: Vec<RwLockWriteGuard<'a, QueueState>>,
}

impl<'a> QueueWriteSet<'a> {
    pub(crate) fn lock(queues: &'a [Arc<Queue>]) -> Self {
        debug_assert!(queues.windows(2).all(|w| w[0].id < w[1].id));
        let guards = queues.iter().map(|q| q.inner.write()).collect();
        Self { queues, guards }
    }

    /// The guarded state of one member queue, or None if the queue was not
    /// part of the locked set.
    pub(crate) fn get_mut(&mut self, id: QueueId) -> Option<&mut QueueState> {
        let idx = self.queues.binary_search_by_key(&id, |q| q.id).ok()?;
        Some(&mut self.guards[idx])
    }
}

/// Reject empty identifiers up front.
pub(crate) fn require(value: &str, what: &'static str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(what));
    }
    Ok(())
}
