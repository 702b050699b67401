//! Error types for dynflow.

use thiserror::Error;

use crate::model::TaskState;

#[derive(Debug, Error)]
pub enum Error {
    /// An empty identifier was supplied where a name is required.
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),

    /// The referenced workflow, queue, or task does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate name on creation.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Queue deletion attempted while its ready sequence is non-empty.
    #[error("queue \"{0}\" is not empty")]
    NotEmpty(String),

    /// A state change the task's lifecycle does not allow, e.g. adding a
    /// dependency to a task that has already started executing.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    /// The requested dependency edge would close a cycle.
    #[error("dependency of \"{dependent}\" on \"{prerequisite}\" would create a cycle")]
    DependencyCycle {
        prerequisite: String,
        dependent: String,
    },
}

impl Error {
    pub(crate) fn workflow_not_found(name: &str) -> Self {
        Error::NotFound(format!("workflow \"{name}\""))
    }

    pub(crate) fn queue_not_found(name: &str) -> Self {
        Error::NotFound(format!("queue \"{name}\""))
    }

    pub(crate) fn task_not_found(workflow: &str, name: &str) -> Self {
        Error::NotFound(format!("task \"{name}\" in workflow \"{workflow}\""))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
