//! Task creation and dependency wiring.
//!
//! A task is registered in its workflow's arena at creation; whether it
//! also lands in its queue's ready sequence depends on the workflow's
//! suspend gate. Dependency edges are recorded both ways and gate
//! dispatch through the dependent's outstanding set.

use tracing::debug;

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{Task, TaskState};

use super::{Database, require};

impl Database {
    /// Create a task in a workflow, targeting a queue.
    ///
    /// Dependency-free at birth, so if the workflow is active the task is
    /// admitted to the queue's ready sequence in the same locked step.
    pub fn create_task(&self, workflow_name: &str, name: &str, queue_name: &str) -> Result<()> {
        require(workflow_name, "workflow name")?;
        require(name, "task name")?;
        require(queue_name, "queue name")?;

        // Hold both collection read locks across the mutation: the
        // workflows lock keeps a concurrent retirement from removing the
        // workflow mid-creation, the queues lock keeps the target queue
        // from being deleted. Without the former, a task created in the
        // retirement window would push a ready entry whose workflow no
        // longer resolves.
        let workflows = self.workflows.read();
        let workflow = workflows
            .get_by_name(workflow_name)
            .cloned()
            .ok_or_else(|| Error::workflow_not_found(workflow_name))?;
        let queues = self.queues.read();
        let queue = queues
            .get_by_name(queue_name)
            .cloned()
            .ok_or_else(|| Error::queue_not_found(queue_name))?;

        let mut wf = workflow.inner.write();
        if wf.task_names.contains_key(name) {
            return Err(Error::AlreadyExists(format!(
                "task \"{name}\" in workflow \"{workflow_name}\""
            )));
        }

        let task = Task::new(name, queue.id);
        let task_id = task.id;
        let admitted = !wf.suspended;
        if admitted {
            // Workflow lock is already held; queue lock nests under it.
            let mut q = queue.inner.write();
            wf.insert_task(task);
            q.ready.push_back((workflow.id, task_id));
        } else {
            wf.insert_task(task);
        }
        drop(wf);
        drop(queues);
        drop(workflows);

        self.events.record(EventKind::TaskCreated {
            workflow: workflow_name.to_string(),
            task: name.to_string(),
            queue: queue_name.to_string(),
            admitted,
        });
        debug!(
            workflow = workflow_name,
            task = name,
            queue = queue_name,
            admitted,
            "task created"
        );
        Ok(())
    }

    /// Declare that `dependent` must not run before `prerequisite`
    /// completes. Both tasks must belong to `workflow_name`.
    ///
    /// Fails with `InvalidTransition` once the dependent has started
    /// executing, and with `DependencyCycle` if the edge would close a
    /// cycle; in both cases no relation set is touched.
    pub fn add_dependency(
        &self,
        workflow_name: &str,
        prerequisite: &str,
        dependent: &str,
    ) -> Result<()> {
        require(workflow_name, "workflow name")?;
        require(prerequisite, "prerequisite task name")?;
        require(dependent, "dependent task name")?;

        // Same collection-lock discipline as create_task.
        let workflows = self.workflows.read();
        let workflow = workflows
            .get_by_name(workflow_name)
            .cloned()
            .ok_or_else(|| Error::workflow_not_found(workflow_name))?;
        let queues = self.queues.read();
        let mut wf = workflow.inner.write();

        let prereq_id = wf
            .task_id(prerequisite)
            .ok_or_else(|| Error::task_not_found(workflow_name, prerequisite))?;
        let dep_id = wf
            .task_id(dependent)
            .ok_or_else(|| Error::task_not_found(workflow_name, dependent))?;

        if prereq_id == dep_id || wf.reaches(dep_id, prereq_id) {
            return Err(Error::DependencyCycle {
                prerequisite: prerequisite.to_string(),
                dependent: dependent.to_string(),
            });
        }

        let (dep_state, dep_queue_id) = {
            let dep = wf
                .tasks
                .get(&dep_id)
                .ok_or_else(|| Error::task_not_found(workflow_name, dependent))?;
            (dep.state, dep.queue_id)
        };
        if !dep_state.accepts_dependencies() {
            return Err(Error::InvalidTransition {
                from: dep_state,
                to: TaskState::AwaitDependence,
            });
        }

        // A dependent sitting in a ready sequence must come out before the
        // edge exists, or it could be dispatched ahead of its prerequisite.
        if dep_state == TaskState::Queued && !wf.suspended {
            if let Some(queue) = queues.get_by_id(dep_queue_id) {
                queue.inner.write().withdraw(workflow.id, dep_id);
            }
        }

        let prereq_gates = wf
            .tasks
            .get(&prereq_id)
            .is_some_and(|p| !p.state.is_terminal());

        if let Some(dep) = wf.tasks.get_mut(&dep_id) {
            dep.transition(TaskState::AwaitDependence)?;
            // Duplicate edges collapse; outstanding only tracks the first.
            if dep.depends_on.insert(prereq_id) && prereq_gates {
                dep.outstanding.insert(prereq_id);
            }
        }
        if let Some(prereq) = wf.tasks.get_mut(&prereq_id) {
            if !prereq.dependents.contains(&dep_id) {
                prereq.dependents.push(dep_id);
            }
        }
        drop(wf);
        drop(queues);
        drop(workflows);

        self.events.record(EventKind::DependencyAdded {
            workflow: workflow_name.to_string(),
            prerequisite: prerequisite.to_string(),
            dependent: dependent.to_string(),
        });
        debug!(
            workflow = workflow_name,
            prerequisite, dependent, "dependency added"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::new();
        db.create_workflow("wf").unwrap();
        db.create_queue("q1").unwrap();
        db
    }

    #[test]
    fn dependency_wires_both_relation_sets() {
        let db = seeded();
        db.create_task("wf", "a", "q1").unwrap();
        db.create_task("wf", "b", "q1").unwrap();
        db.add_dependency("wf", "a", "b").unwrap();

        let workflow = db.workflow("wf").unwrap();
        let wf = workflow.inner.read();
        let a = &wf.tasks[&wf.task_id("a").unwrap()];
        let b = &wf.tasks[&wf.task_id("b").unwrap()];

        assert_eq!(a.dependents, vec![b.id]);
        assert!(a.depends_on.is_empty());
        assert!(a.outstanding.is_empty());
        assert_eq!(a.state, TaskState::Queued);

        assert!(b.dependents.is_empty());
        assert!(b.depends_on.contains(&a.id));
        assert!(b.outstanding.contains(&a.id));
        assert_eq!(b.state, TaskState::AwaitDependence);
    }

    #[test]
    fn duplicate_edge_is_collapsed() {
        let db = seeded();
        db.create_task("wf", "a", "q1").unwrap();
        db.create_task("wf", "b", "q1").unwrap();
        db.add_dependency("wf", "a", "b").unwrap();
        db.add_dependency("wf", "a", "b").unwrap();

        let workflow = db.workflow("wf").unwrap();
        let wf = workflow.inner.read();
        let a = &wf.tasks[&wf.task_id("a").unwrap()];
        let b = &wf.tasks[&wf.task_id("b").unwrap()];
        assert_eq!(a.dependents.len(), 1);
        assert_eq!(b.depends_on.len(), 1);
        assert_eq!(b.outstanding.len(), 1);
    }

    #[test]
    fn dependents_keep_declaration_order() {
        let db = seeded();
        db.create_task("wf", "root", "q1").unwrap();
        for name in ["c", "a", "b"] {
            db.create_task("wf", name, "q1").unwrap();
            db.add_dependency("wf", "root", name).unwrap();
        }

        let workflow = db.workflow("wf").unwrap();
        let wf = workflow.inner.read();
        let root = &wf.tasks[&wf.task_id("root").unwrap()];
        let declared: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|n| wf.task_id(n).unwrap())
            .collect();
        assert_eq!(root.dependents, declared);
    }

    #[test]
    fn completed_prerequisite_never_gates_but_still_parks_the_dependent() {
        let db = seeded();
        db.create_queue("q2").unwrap();
        db.create_task("wf", "a", "q1").unwrap();
        db.create_task("wf", "b", "q2").unwrap();
        db.resume_workflow("wf").unwrap();

        let got = db.dequeue("q1").unwrap().unwrap();
        assert_eq!(got.task, "a");
        db.complete_task("wf", "a").unwrap();

        // Edge on a terminal prerequisite: the dependent is withdrawn and
        // parked awaiting dependence, with nothing outstanding. Only a
        // completion re-queues it, so it stays parked; releasing it again
        // is the caller's job.
        db.add_dependency("wf", "a", "b").unwrap();

        let workflow = db.workflow("wf").unwrap();
        let wf = workflow.inner.read();
        let a_id = wf.task_id("a").unwrap();
        let b = &wf.tasks[&wf.task_id("b").unwrap()];
        assert_eq!(b.state, TaskState::AwaitDependence);
        assert!(b.depends_on.contains(&a_id));
        assert!(b.outstanding.is_empty());
        drop(wf);

        assert!(db.dequeue("q2").unwrap().is_none());
    }

    #[test]
    fn cycle_is_rejected_and_sets_untouched() {
        let db = seeded();
        db.create_task("wf", "a", "q1").unwrap();
        db.create_task("wf", "b", "q1").unwrap();
        db.create_task("wf", "c", "q1").unwrap();
        db.add_dependency("wf", "a", "b").unwrap();
        db.add_dependency("wf", "b", "c").unwrap();

        assert!(matches!(
            db.add_dependency("wf", "c", "a").unwrap_err(),
            Error::DependencyCycle { .. }
        ));
        assert!(matches!(
            db.add_dependency("wf", "a", "a").unwrap_err(),
            Error::DependencyCycle { .. }
        ));

        let workflow = db.workflow("wf").unwrap();
        let wf = workflow.inner.read();
        let a = &wf.tasks[&wf.task_id("a").unwrap()];
        let c = &wf.tasks[&wf.task_id("c").unwrap()];
        assert!(a.depends_on.is_empty());
        assert!(c.dependents.is_empty());
    }
}
