// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Structural errors (duplicate task, unknown task, cycles) are returned
//! before any state is touched. Execution failures are *not* errors of the
//! call that drove them: they end up as `TaskStatus::Failed` plus an event.

use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Circular dependency: {task} cannot depend on {depends_on}")]
    CircularDependency { task: TaskId, depends_on: TaskId },

    #[error("Cycle detected in dependency graph: {0}")]
    CycleDetected(String),

    #[error("Dependency not satisfied: {task} waits on {dependency} ({status})")]
    DependencyNotSatisfied {
        task: TaskId,
        dependency: TaskId,
        status: TaskStatus,
    },

    #[error("Invalid state: cannot {operation} task {task} while {status}")]
    InvalidState {
        task: TaskId,
        status: TaskStatus,
        operation: &'static str,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Statistics series is empty")]
    EmptySeries,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_task() {
        let id = TaskId::new();
        let err = BackupError::TaskNotFound(id);
        assert_eq!(err.to_string(), format!("Task not found: {id}"));

        let err = BackupError::InvalidState {
            task: id,
            status: TaskStatus::Succeeded,
            operation: "update progress of",
        };
        assert_eq!(
            err.to_string(),
            format!("Invalid state: cannot update progress of task {id} while succeeded")
        );
    }
}
