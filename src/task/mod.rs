// src/task/mod.rs

//! The task entity: one schedulable unit of backup work.
//!
//! Tasks are plain values. All mutation goes through
//! [`crate::exec::lifecycle`] (status and progress) or the task manager
//! (cancellation), which keeps the status rules in one place.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use globset::Glob;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BackupError, Result};

/// Unique, immutable task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// No transition is allowed out of a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether this status blocks dependents for good.
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Created, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What to back up. Handed to the backend untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupParameters {
    /// Identity of the target repository (also the credential store key).
    pub repository_id: String,
    pub paths: Vec<PathBuf>,
    /// Glob patterns excluded from the backup.
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BackupParameters {
    pub fn new(repository_id: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            repository_id: repository_id.into(),
            paths,
            excludes: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Check that the parameters are well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.repository_id.trim().is_empty() {
            return Err(BackupError::Validation(
                "repository id must not be empty".to_string(),
            ));
        }
        if self.paths.is_empty() {
            return Err(BackupError::Validation(
                "at least one path to back up is required".to_string(),
            ));
        }
        if let Some(path) = self.paths.iter().find(|p| p.as_os_str().is_empty()) {
            return Err(BackupError::Validation(format!(
                "empty backup path in {:?}",
                path
            )));
        }
        for pattern in &self.excludes {
            Glob::new(pattern).map_err(|e| {
                BackupError::Validation(format!("invalid exclude pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// Input to `TaskManager::create_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub parameters: BackupParameters,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, parameters: BackupParameters) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BackupError::Validation(
                "task name must not be empty".to_string(),
            ));
        }
        self.parameters.validate()
    }
}

/// One unit of backup work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub parameters: BackupParameters,
    pub status: TaskStatus,
    /// Tasks that must reach `Succeeded` before this one may run.
    pub dependencies: BTreeSet<TaskId>,
    /// Fraction done, in `[0, 1]`.
    pub progress: f64,
    /// Failure detail, set when the task ends `Failed`.
    pub error: Option<String>,
}

impl Task {
    /// Build a fresh `Created` task from a validated spec.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: TaskId::new(),
            name: spec.name,
            parameters: spec.parameters,
            status: TaskStatus::Created,
            dependencies: BTreeSet::new(),
            progress: 0.0,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, enforcing the transition table.
    pub(crate) fn transition(&mut self, next: TaskStatus, operation: &'static str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BackupError::InvalidState {
                task: self.id,
                status: self.status,
                operation,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BackupParameters {
        BackupParameters::new("nas", vec![PathBuf::from("/home/me/Documents")])
    }

    #[test]
    fn terminal_statuses_accept_no_transition() {
        for terminal in [TaskStatus::Succeeded, TaskStatus::Failed, TaskStatus::Cancelled] {
            for next in [
                TaskStatus::Created,
                TaskStatus::Queued,
                TaskStatus::Running,
                TaskStatus::Succeeded,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn created_cannot_jump_to_running() {
        let mut task = Task::from_spec(TaskSpec::new("docs", params()));
        let err = task.transition(TaskStatus::Running, "start").unwrap_err();
        assert!(matches!(err, BackupError::InvalidState { .. }));
        assert_eq!(task.status, TaskStatus::Created);
    }

    #[test]
    fn spec_validation_rejects_blank_name_and_bad_parameters() {
        assert!(matches!(
            TaskSpec::new("   ", params()).validate(),
            Err(BackupError::Validation(_))
        ));

        let mut bad = params();
        bad.repository_id = String::new();
        assert!(TaskSpec::new("docs", bad).validate().is_err());

        let mut bad = params();
        bad.paths.clear();
        assert!(TaskSpec::new("docs", bad).validate().is_err());

        let mut bad = params();
        bad.excludes.push("a[".to_string());
        assert!(TaskSpec::new("docs", bad).validate().is_err());

        assert!(TaskSpec::new("docs", params()).validate().is_ok());
    }
}
