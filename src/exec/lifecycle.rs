// src/exec/lifecycle.rs

//! Status and progress transitions for a single task.
//!
//! These functions are the only place where a task's status moves through
//! `Created -> Queued -> Running -> {Succeeded, Failed, Cancelled}`. They are
//! synchronous and operate on a borrowed task, so the task manager can call
//! them while holding its registry lock.

use tracing::debug;

use crate::errors::{BackupError, Result};
use crate::stats::BackupStatistics;
use crate::task::{Task, TaskId, TaskStatus};

/// Terminal result of driving a task, as reported by its executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded(BackupStatistics),
    Failed(String),
    /// `forced` is set when the backend never acknowledged the abort.
    Cancelled { forced: bool },
}

/// What `cancel` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAction {
    /// The task was already terminal; nothing changed.
    AlreadyTerminal,
    /// The task never ran and is now `Cancelled`.
    Cancelled,
    /// The task is running; the backend must be asked to abort.
    AbortRequested,
}

/// Mark a task for execution without starting it.
pub fn enqueue(task: &mut Task) -> Result<()> {
    match task.status {
        TaskStatus::Queued => Ok(()),
        _ => task.transition(TaskStatus::Queued, "queue"),
    }
}

/// Move a task into `Running`.
///
/// `dependencies` carries the current status of every dependency; all of
/// them must be `Succeeded`.
pub fn start(task: &mut Task, dependencies: &[(TaskId, TaskStatus)]) -> Result<()> {
    if !matches!(task.status, TaskStatus::Created | TaskStatus::Queued) {
        return Err(BackupError::InvalidState {
            task: task.id,
            status: task.status,
            operation: "start",
        });
    }

    if let Some((dependency, status)) = dependencies
        .iter()
        .find(|(_, status)| *status != TaskStatus::Succeeded)
    {
        return Err(BackupError::DependencyNotSatisfied {
            task: task.id,
            dependency: *dependency,
            status: *status,
        });
    }

    enqueue(task)?;
    task.transition(TaskStatus::Running, "start")?;
    task.progress = 0.0;
    task.error = None;
    Ok(())
}

/// Record a progress report and return the value actually stored.
///
/// Reports are only accepted while running. Values are clamped to `[0, 1]`
/// and never move backwards.
pub fn update_progress(task: &mut Task, value: f64) -> Result<f64> {
    if task.status != TaskStatus::Running {
        return Err(BackupError::InvalidState {
            task: task.id,
            status: task.status,
            operation: "update progress of",
        });
    }
    if value.is_nan() {
        return Err(BackupError::Validation(format!(
            "progress for task {} is not a number",
            task.id
        )));
    }

    let clamped = value.clamp(0.0, 1.0);
    if clamped < task.progress {
        debug!(
            task = %task.id,
            reported = value,
            kept = task.progress,
            "out-of-order progress report; keeping last value"
        );
    }
    task.progress = task.progress.max(clamped);
    Ok(task.progress)
}

/// Cancel a task. Idempotent for terminal tasks.
pub fn cancel(task: &mut Task) -> CancelAction {
    match task.status {
        status if status.is_terminal() => CancelAction::AlreadyTerminal,
        TaskStatus::Running => CancelAction::AbortRequested,
        _ => {
            task.status = TaskStatus::Cancelled;
            CancelAction::Cancelled
        }
    }
}

/// Apply the terminal outcome of a running task.
///
/// Returns the statistics record to forward when the task succeeded.
pub fn complete(task: &mut Task, outcome: ExecutionOutcome) -> Result<Option<BackupStatistics>> {
    if task.status != TaskStatus::Running {
        return Err(BackupError::InvalidState {
            task: task.id,
            status: task.status,
            operation: "complete",
        });
    }

    match outcome {
        ExecutionOutcome::Succeeded(stats) => {
            task.transition(TaskStatus::Succeeded, "complete")?;
            task.progress = 1.0;
            Ok(Some(stats))
        }
        ExecutionOutcome::Failed(detail) => {
            task.transition(TaskStatus::Failed, "complete")?;
            task.error = Some(detail);
            Ok(None)
        }
        ExecutionOutcome::Cancelled { .. } => {
            task.transition(TaskStatus::Cancelled, "complete")?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::task::{BackupParameters, TaskSpec};

    fn task() -> Task {
        Task::from_spec(TaskSpec::new(
            "docs",
            BackupParameters::new("nas", vec![PathBuf::from("/srv/docs")]),
        ))
    }

    fn running() -> Task {
        let mut t = task();
        start(&mut t, &[]).unwrap();
        t
    }

    #[test]
    fn start_requires_succeeded_dependencies() {
        let mut t = task();
        let dep = TaskId::new();
        let err = start(&mut t, &[(dep, TaskStatus::Running)]).unwrap_err();
        assert!(matches!(
            err,
            BackupError::DependencyNotSatisfied { dependency, status: TaskStatus::Running, .. } if dependency == dep
        ));
        assert_eq!(t.status, TaskStatus::Created);

        start(&mut t, &[(dep, TaskStatus::Succeeded)]).unwrap();
        assert_eq!(t.status, TaskStatus::Running);
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let mut t = running();
        assert_eq!(update_progress(&mut t, 0.4).unwrap(), 0.4);
        assert_eq!(update_progress(&mut t, 0.2).unwrap(), 0.4);
        assert_eq!(update_progress(&mut t, 7.0).unwrap(), 1.0);
        assert!(update_progress(&mut t, f64::NAN).is_err());
        assert_eq!(t.progress, 1.0);
    }

    #[test]
    fn progress_outside_running_is_rejected_without_mutation() {
        let mut t = task();
        assert!(matches!(
            update_progress(&mut t, 0.5),
            Err(BackupError::InvalidState { .. })
        ));
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut t = task();
        assert_eq!(cancel(&mut t), CancelAction::Cancelled);
        assert_eq!(cancel(&mut t), CancelAction::AlreadyTerminal);
        assert_eq!(t.status, TaskStatus::Cancelled);

        let mut r = running();
        assert_eq!(cancel(&mut r), CancelAction::AbortRequested);
        assert_eq!(r.status, TaskStatus::Running);
    }

    #[test]
    fn complete_records_outcome() {
        let mut t = running();
        let stats = complete(&mut t, ExecutionOutcome::Succeeded(BackupStatistics::default())).unwrap();
        assert!(stats.is_some());
        assert_eq!(t.status, TaskStatus::Succeeded);
        assert_eq!(t.progress, 1.0);

        let mut f = running();
        assert_eq!(complete(&mut f, ExecutionOutcome::Failed("disk full".into())).unwrap(), None);
        assert_eq!(f.error.as_deref(), Some("disk full"));

        // Terminal tasks cannot be completed again.
        assert!(complete(&mut f, ExecutionOutcome::Cancelled { forced: false }).is_err());
        assert_eq!(f.status, TaskStatus::Failed);
    }
}
