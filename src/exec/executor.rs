// src/exec/executor.rs

//! Drives one task against the backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::engine::RuntimeEvent;
use crate::errors::{BackupError, Result};
use crate::exec::backend::{BackendEvent, BackupBackend, ScheduledBackup};
use crate::exec::lifecycle::ExecutionOutcome;

/// Owns the backend conversation for exactly one running task.
///
/// The executor never touches task state directly: it relays backend events
/// to the runtime loop as [`RuntimeEvent`]s, in the order the backend
/// produced them, and always finishes with exactly one
/// `RuntimeEvent::Completed`.
pub struct TaskExecutor {
    job: ScheduledBackup,
    backend: Arc<dyn BackupBackend>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        job: ScheduledBackup,
        backend: Arc<dyn BackupBackend>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        cancel_timeout: Duration,
    ) -> Self {
        Self {
            job,
            backend,
            runtime_tx,
            cancel_timeout,
        }
    }

    /// Run the task to a terminal outcome.
    ///
    /// If `cancel_rx` fires, the backend is asked to abort. The abort is
    /// awaited for at most `cancel_timeout`; past that the task is
    /// force-cancelled and the abandoned backend work is only logged.
    pub async fn run(self, cancel_rx: oneshot::Receiver<()>) {
        let task = self.job.task_id;
        let outcome = match self.drive(cancel_rx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(task = %task, name = %self.job.name, error = %err, "backup execution error");
                ExecutionOutcome::Failed(err.to_string())
            }
        };

        if self
            .runtime_tx
            .send(RuntimeEvent::Completed { task, outcome })
            .await
            .is_err()
        {
            debug!(task = %task, "runtime loop gone before completion was reported");
        }
    }

    async fn drive(&self, mut cancel_rx: oneshot::Receiver<()>) -> Result<ExecutionOutcome> {
        let task = self.job.task_id;
        info!(
            task = %task,
            name = %self.job.name,
            repository = %self.job.parameters.repository_id,
            "starting backup"
        );

        let mut cancel_open = true;
        let mut starting = self.backend.execute(self.job.clone());

        // The backend may take arbitrarily long to hand back its stream;
        // a cancellation must still reach it in the meantime.
        let started = loop {
            tokio::select! {
                started = &mut starting => break Some(started),

                cancel = &mut cancel_rx, if cancel_open => match cancel {
                    Ok(()) => break None,
                    Err(_) => cancel_open = false,
                },
            }
        };
        drop(starting);

        let Some(started) = started else {
            info!(task = %task, "cancellation requested before backend started; aborting");
            return Ok(self.abort().await);
        };
        let mut events = started?;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(BackendEvent::Progress(value)) => {
                        if self
                            .runtime_tx
                            .send(RuntimeEvent::Progress { task, value })
                            .await
                            .is_err()
                        {
                            debug!(task = %task, "runtime loop gone; dropping progress report");
                        }
                    }
                    Some(BackendEvent::Succeeded(stats)) => {
                        info!(task = %task, total_size = stats.total_size(), "backup succeeded");
                        return Ok(ExecutionOutcome::Succeeded(stats));
                    }
                    Some(BackendEvent::Failed(detail)) => {
                        return Err(BackupError::Backend(detail));
                    }
                    None => {
                        return Err(BackupError::Backend(
                            "backend stream closed without a terminal status".to_string(),
                        ));
                    }
                },

                cancel = &mut cancel_rx, if cancel_open => match cancel {
                    Ok(()) => {
                        info!(task = %task, "cancellation requested for running backup; aborting");
                        return Ok(self.abort().await);
                    }
                    Err(_) => {
                        // Handle dropped without a request; only the backend can end the run now.
                        cancel_open = false;
                    }
                },
            }
        }
    }

    async fn abort(&self) -> ExecutionOutcome {
        let task = self.job.task_id;
        match timeout(self.cancel_timeout, self.backend.abort(task)).await {
            Ok(Ok(())) => {
                info!(task = %task, "backend acknowledged abort");
                ExecutionOutcome::Cancelled { forced: false }
            }
            Ok(Err(err)) => {
                warn!(task = %task, error = %err, "backend abort failed; marking task cancelled anyway");
                ExecutionOutcome::Cancelled { forced: true }
            }
            Err(_) => {
                warn!(
                    task = %task,
                    timeout_ms = self.cancel_timeout.as_millis() as u64,
                    "backend did not acknowledge abort in time; abandoning in-flight work"
                );
                ExecutionOutcome::Cancelled { forced: true }
            }
        }
    }
}
