//! Workflow operations: create, resume, suspend.
//!
//! Workflows are born suspended so a caller can lay out the whole task
//! graph before anything is dispatched. Resume admits every dependency-free
//! task at once; suspend withdraws them again. Retirement (removal on full
//! completion) is driven by `complete_task` in the queue module.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{QueueId, TaskId, TaskState};

use super::{Database, QueueWriteSet, lock_order, require};

impl Database {
    /// Create a workflow. Starts suspended.
    pub fn create_workflow(&self, name: &str) -> Result<()> {
        require(name, "workflow name")?;
        self.register_workflow(name)?;
        self.events.record(EventKind::WorkflowCreated {
            workflow: name.to_string(),
        });
        debug!(workflow = name, "workflow created");
        Ok(())
    }

    /// Is a workflow with this name currently live?
    pub fn workflow_exists(&self, name: &str) -> bool {
        self.workflows.read().contains_name(name)
    }

    /// Activate a suspended workflow, admitting its dependency-free tasks
    /// to their queues. No-op when already active.
    pub fn resume_workflow(&self, name: &str) -> Result<()> {
        require(name, "workflow name")?;
        // Collection read locks held across the admission, level order.
        // The workflows lock fences out a concurrent retirement; the
        // target queues are only known under the workflow entity lock.
        let workflows = self.workflows.read();
        let workflow = workflows
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| Error::workflow_not_found(name))?;
        let queues = self.queues.read();
        let mut wf = workflow.inner.write();
        if !wf.suspended {
            return Ok(());
        }

        // Dependency-free tasks withheld while suspended, including any
        // that became ready through completions during suspension.
        let pending: Vec<(TaskId, QueueId)> = wf
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Queued)
            .map(|t| (t.id, t.queue_id))
            .collect();

        let targets = lock_order(
            pending
                .iter()
                .filter_map(|(_, queue_id)| queues.get_by_id(*queue_id).cloned())
                .collect(),
        );
        let mut locked = QueueWriteSet::lock(&targets);
        for (task_id, queue_id) in &pending {
            match locked.get_mut(*queue_id) {
                Some(queue) => queue.ready.push_back((workflow.id, *task_id)),
                // Target queue deleted while the workflow was suspended;
                // the task stays withheld.
                None => warn!(workflow = name, task = %task_id, "target queue no longer exists"),
            }
        }
        wf.suspended = false;
        drop(locked);
        drop(wf);
        drop(queues);
        drop(workflows);

        self.events.record(EventKind::WorkflowResumed {
            workflow: name.to_string(),
            admitted: pending.len(),
        });
        debug!(workflow = name, admitted = pending.len(), "workflow resumed");
        Ok(())
    }

    /// Suspend an active workflow, withdrawing its queued tasks from their
    /// ready sequences. Running tasks are left alone; dependents they
    /// unblock are marked `Queued` but withheld until the next resume.
    /// No-op when already suspended.
    pub fn suspend_workflow(&self, name: &str) -> Result<()> {
        require(name, "workflow name")?;
        let workflows = self.workflows.read();
        let workflow = workflows
            .get_by_name(name)
            .cloned()
            .ok_or_else(|| Error::workflow_not_found(name))?;
        let queues = self.queues.read();
        let mut wf = workflow.inner.write();
        if wf.suspended {
            return Ok(());
        }

        let queued: Vec<(TaskId, QueueId)> = wf
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Queued)
            .map(|t| (t.id, t.queue_id))
            .collect();

        let targets = lock_order(
            queued
                .iter()
                .filter_map(|(_, queue_id)| queues.get_by_id(*queue_id).cloned())
                .collect(),
        );
        let mut locked = QueueWriteSet::lock(&targets);
        for (task_id, queue_id) in &queued {
            if let Some(queue) = locked.get_mut(*queue_id) {
                queue.withdraw(workflow.id, *task_id);
            }
        }
        wf.suspended = true;
        drop(locked);
        drop(wf);
        drop(queues);
        drop(workflows);

        self.events.record(EventKind::WorkflowSuspended {
            workflow: name.to_string(),
            withdrawn: queued.len(),
        });
        debug!(
            workflow = name,
            withdrawn = queued.len(),
            "workflow suspended"
        );
        Ok(())
    }
}
