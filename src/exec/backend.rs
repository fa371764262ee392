// src/exec/backend.rs

//! Pluggable backup backend abstraction.
//!
//! The engine never transfers data itself. It hands a [`ScheduledBackup`] to a
//! `BackupBackend`, which answers with a stream of [`BackendEvent`]s: any
//! number of progress reports followed by exactly one terminal event.
//!
//! Tests provide scripted implementations (see `backupdag-test-utils`);
//! production code wires in whatever drives the real backup tool.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::Result;
use crate::stats::BackupStatistics;
use crate::task::{BackupParameters, Task, TaskId};

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Event emitted by the backend for one running task.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Fraction done, expected in `[0, 1]`.
    Progress(f64),
    /// Terminal: the backup finished and produced statistics.
    Succeeded(BackupStatistics),
    /// Terminal: the backup failed.
    Failed(String),
}

impl BackendEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BackendEvent::Progress(_))
    }
}

/// Description of a task the engine wants the backend to run now.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBackup {
    pub task_id: TaskId,
    pub name: String,
    pub parameters: BackupParameters,
}

impl ScheduledBackup {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            name: task.name.clone(),
            parameters: task.parameters.clone(),
        }
    }
}

/// Trait abstracting how backups are executed.
pub trait BackupBackend: Send + Sync {
    /// Start the backup described by `job` and return its event stream.
    ///
    /// The stream ends after the terminal event. A stream that closes
    /// without one is treated as a backend failure.
    fn execute(&self, job: ScheduledBackup) -> BackendFuture<'_, mpsc::Receiver<BackendEvent>>;

    /// Ask the backend to abort in-flight work for `task`.
    ///
    /// Resolving `Ok(())` is the acknowledgment; the engine bounds the wait
    /// with its cancel timeout.
    fn abort(&self, task: TaskId) -> BackendFuture<'_, ()>;
}
