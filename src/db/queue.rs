//! Queue operations: create, delete, peek, and the dequeue/complete
//! protocol that drives the dependency-resolution cascade.
//!
//! Dequeue is deliberately non-blocking: a race on the head yields an
//! empty result and the caller re-polls. Completion is the most
//! lock-heavy path in the engine; every queue it touches is locked
//! through [`QueueWriteSet`] in ascending identity order.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{QueueId, QueueTask, TaskId, TaskState};

use super::{Database, Queue, QueueWriteSet, lock_order, require};

impl Database {
    /// Create a queue. Queues are never auto-created.
    pub fn create_queue(&self, name: &str) -> Result<()> {
        require(name, "queue name")?;
        self.register_queue(name)?;
        self.events.record(EventKind::QueueCreated {
            queue: name.to_string(),
        });
        debug!(queue = name, "queue created");
        Ok(())
    }

    /// Is a queue with this name registered?
    pub fn queue_exists(&self, name: &str) -> bool {
        self.queues.read().contains_name(name)
    }

    /// Is the ready sequence empty? Checked-out tasks don't count.
    pub fn queue_is_empty(&self, name: &str) -> Result<bool> {
        require(name, "queue name")?;
        let queue = self.queue(name)?;
        let empty = queue.inner.read().ready.is_empty();
        Ok(empty)
    }

    /// Number of tasks waiting in the ready sequence.
    pub fn queued_count(&self, name: &str) -> Result<usize> {
        require(name, "queue name")?;
        let queue = self.queue(name)?;
        let count = queue.inner.read().ready.len();
        Ok(count)
    }

    /// Number of tasks checked out (dequeued, not yet completed).
    pub fn running_count(&self, name: &str) -> Result<usize> {
        require(name, "queue name")?;
        let queue = self.queue(name)?;
        let count = queue.inner.read().checked_out.len();
        Ok(count)
    }

    /// Delete a queue. Fails with `NotEmpty` while tasks wait in the ready
    /// sequence; checked-out tasks do not block deletion.
    pub fn delete_queue(&self, name: &str) -> Result<()> {
        require(name, "queue name")?;
        let mut queues = self.queues.write();
        let queue = queues
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| Error::queue_not_found(name))?;
        if !queue.inner.read().ready.is_empty() {
            return Err(Error::NotEmpty(name.to_string()));
        }
        queues.remove(queue.id);
        drop(queues);

        self.events.record(EventKind::QueueDeleted {
            queue: name.to_string(),
        });
        debug!(queue = name, "queue deleted");
        Ok(())
    }

    /// The head of the ready sequence, without mutation. `None` when the
    /// queue is empty.
    pub fn peek(&self, queue_name: &str) -> Result<Option<QueueTask>> {
        require(queue_name, "queue name")?;
        let queue = self.queue(queue_name)?;
        let head = { queue.inner.read().ready.front().copied() };
        let Some((workflow_id, task_id)) = head else {
            return Ok(None);
        };

        // Resolve names with the queue lock already released.
        let Some(workflow) = self.workflow_by_id(workflow_id) else {
            return Ok(None);
        };
        let wf = workflow.inner.read();
        Ok(wf.tasks.get(&task_id).map(|task| QueueTask {
            workflow: workflow.name.clone(),
            task: task.name.clone(),
        }))
    }

    /// Check out the head of the ready sequence, transitioning the task to
    /// `Running`.
    ///
    /// May return `None` even when the queue appeared non-empty a moment
    /// earlier: the head is read optimistically and re-validated under
    /// write locks, and a head raced away by a concurrent dequeue yields
    /// an empty result rather than an internal retry. Callers poll.
    pub fn dequeue(&self, queue_name: &str) -> Result<Option<QueueTask>> {
        require(queue_name, "queue name")?;
        let queue = self.queue(queue_name)?;
        let head = { queue.inner.read().ready.front().copied() };
        let Some((workflow_id, task_id)) = head else {
            return Ok(None);
        };
        let Some(workflow) = self.workflow_by_id(workflow_id) else {
            // Head references a retired workflow. Discard it (after
            // re-validating under the write lock) so it cannot block
            // dispatch of everything queued behind it.
            let mut q = queue.inner.write();
            if q.ready.front() == Some(&(workflow_id, task_id)) {
                q.ready.pop_front();
                trace!(queue = queue_name, "discarded stale head");
            }
            return Ok(None);
        };

        // Workflow lock first, then queue lock, per the hierarchy.
        let mut wf = workflow.inner.write();
        let mut q = queue.inner.write();
        if q.ready.front() != Some(&(workflow_id, task_id)) {
            trace!(queue = queue_name, "head raced away, yielding no task");
            return Ok(None);
        }
        let Some(task) = wf.tasks.get_mut(&task_id) else {
            q.ready.pop_front();
            return Ok(None);
        };
        task.transition(TaskState::Running)?;
        q.ready.pop_front();
        q.checked_out.insert(task_id);
        let out = QueueTask {
            workflow: workflow.name.clone(),
            task: task.name.clone(),
        };
        drop(q);
        drop(wf);

        self.events.record(EventKind::TaskDequeued {
            workflow: out.workflow.clone(),
            task: out.task.clone(),
            queue: queue_name.to_string(),
        });
        trace!(
            workflow = %out.workflow,
            task = %out.task,
            queue = queue_name,
            "task dequeued"
        );
        Ok(Some(out))
    }

    /// Report a checked-out task as done.
    ///
    /// Cascades through the dependency graph: every dependent whose last
    /// outstanding prerequisite this was becomes `Queued` and, if the
    /// workflow is active, is admitted to its own queue's ready sequence
    /// in declaration order. When the last task of the workflow
    /// completes, the workflow is retired from the registry.
    pub fn complete_task(&self, workflow_name: &str, task_name: &str) -> Result<()> {
        require(workflow_name, "workflow name")?;
        require(task_name, "task name")?;
        let workflow = self.workflow(workflow_name)?;

        // Queues collection read lock held across the cascade; the
        // successor queues are only discovered under the workflow lock.
        let queues = self.queues.read();
        let mut wf = workflow.inner.write();

        let task_id = wf
            .task_id(task_name)
            .ok_or_else(|| Error::task_not_found(workflow_name, task_name))?;
        let (own_queue_id, dependents) = {
            let task = wf
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| Error::task_not_found(workflow_name, task_name))?;
            task.transition(TaskState::Completed)?;
            (task.queue_id, task.dependents.clone())
        };
        wf.completed.insert(task_id);

        // Dependents whose outstanding set just emptied, declaration order.
        let mut newly_ready: Vec<(TaskId, QueueId)> = Vec::new();
        for dep_id in dependents {
            let Some(dep) = wf.tasks.get_mut(&dep_id) else {
                continue;
            };
            dep.outstanding.remove(&task_id);
            if dep.state == TaskState::AwaitDependence && dep.outstanding.is_empty() {
                dep.transition(TaskState::Queued)?;
                newly_ready.push((dep.id, dep.queue_id));
            }
        }

        // Admission is withheld while the workflow is suspended, the same
        // gate task creation applies; resume picks the tasks up later.
        let admit = !wf.suspended;
        let mut targets: Vec<Arc<Queue>> = Vec::new();
        if let Some(own) = queues.get_by_id(own_queue_id) {
            targets.push(own.clone());
        }
        if admit {
            targets.extend(
                newly_ready
                    .iter()
                    .filter_map(|(_, queue_id)| queues.get_by_id(*queue_id).cloned()),
            );
        }
        let targets = lock_order(targets);
        let mut locked = QueueWriteSet::lock(&targets);
        // Own queue may have been deleted; checked-out tasks never block
        // deletion, so completion just skips the bookkeeping.
        if let Some(own) = locked.get_mut(own_queue_id) {
            own.checked_out.remove(&task_id);
        }
        if admit {
            for (dep_id, queue_id) in &newly_ready {
                if let Some(queue) = locked.get_mut(*queue_id) {
                    queue.ready.push_back((workflow.id, *dep_id));
                }
            }
        }
        drop(locked);

        let retire = wf.is_complete();
        let total = wf.tasks.len();
        drop(wf);
        drop(queues);

        self.events.record(EventKind::TaskCompleted {
            workflow: workflow_name.to_string(),
            task: task_name.to_string(),
            unblocked: newly_ready.len(),
        });
        debug!(
            workflow = workflow_name,
            task = task_name,
            unblocked = newly_ready.len(),
            "task completed"
        );

        // Retirement re-acquires the collection lock with all entity locks
        // released, then re-checks completion; see Database::retire_workflow.
        if retire && self.retire_workflow(&workflow) {
            self.events.record(EventKind::WorkflowRetired {
                workflow: workflow_name.to_string(),
                tasks: total,
            });
            debug!(workflow = workflow_name, tasks = total, "workflow retired");
        }
        Ok(())
    }
}
