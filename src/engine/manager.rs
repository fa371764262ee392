// src/engine/manager.rs

//! The task manager: public API over the shared task registry.
//!
//! All registry state sits behind one `std::sync::Mutex`. It is never held
//! across an `.await`; events produced while it is held are collected and
//! published after it is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::dag::{CancelSweep, TaskRegistry};
use crate::engine::events::{CancelReason, EventSink, TaskEvent};
use crate::engine::ManagerOptions;
use crate::errors::{BackupError, Result};
use crate::exec::lifecycle::{self, CancelAction, ExecutionOutcome};
use crate::stats::{BackupStatistics, StatisticsAggregator};
use crate::task::{Task, TaskId, TaskSpec, TaskStatus};

pub(crate) struct ManagerState {
    pub(crate) registry: TaskRegistry,
    /// Abort signal of every task with a live executor. The sender is taken
    /// once the abort has been requested; the entry itself goes away when
    /// the executor's completion is applied.
    pub(crate) aborts: HashMap<TaskId, Option<oneshot::Sender<()>>>,
}

impl ManagerState {
    /// Publish the cancellations of a sweep and signal its running tasks.
    /// Returns every task the sweep touched.
    pub(crate) fn apply_sweep(
        &mut self,
        sweep: CancelSweep,
        events: &mut Vec<TaskEvent>,
    ) -> Vec<TaskId> {
        let mut affected = Vec::with_capacity(sweep.cancelled.len() + sweep.aborting.len());

        for (task, dependency) in sweep.cancelled {
            info!(task = %task, upstream = %dependency, "task cancelled: upstream task did not succeed");
            events.push(TaskEvent::TaskCancelled {
                task,
                reason: CancelReason::UpstreamUnsuccessful { dependency },
            });
            affected.push(task);
        }

        for task in sweep.aborting {
            self.request_abort(task, events);
            affected.push(task);
        }

        affected
    }

    /// Ask the executor of a running task to abort.
    ///
    /// A running task without an executor can never report back, so it is
    /// cancelled on the spot.
    pub(crate) fn request_abort(&mut self, task: TaskId, events: &mut Vec<TaskEvent>) {
        match self.aborts.get_mut(&task) {
            Some(slot) => {
                if let Some(tx) = slot.take() {
                    debug!(task = %task, "signalling abort to executor");
                    let _ = tx.send(());
                }
            }
            None => {
                warn!(task = %task, "running task has no executor; forcing cancellation");
                let forced = self
                    .registry
                    .get_mut(task)
                    .and_then(|t| lifecycle::complete(t, ExecutionOutcome::Cancelled { forced: true }));
                if forced.is_ok() {
                    events.push(TaskEvent::TaskCancelled {
                        task,
                        reason: CancelReason::Forced,
                    });
                }
            }
        }
    }

    /// Apply the terminal outcome of a running task.
    ///
    /// An unsuccessful outcome cancels everything downstream. Returns the
    /// statistics to forward on success.
    pub(crate) fn finish(
        &mut self,
        id: TaskId,
        outcome: ExecutionOutcome,
        events: &mut Vec<TaskEvent>,
    ) -> Result<Option<BackupStatistics>> {
        self.aborts.remove(&id);

        let event = match &outcome {
            ExecutionOutcome::Succeeded(statistics) => TaskEvent::TaskSucceeded {
                task: id,
                statistics: statistics.clone(),
            },
            ExecutionOutcome::Failed(error) => TaskEvent::TaskFailed {
                task: id,
                error: error.clone(),
            },
            ExecutionOutcome::Cancelled { forced } => TaskEvent::TaskCancelled {
                task: id,
                reason: if *forced {
                    CancelReason::Forced
                } else {
                    CancelReason::Requested
                },
            },
        };

        let task = self.registry.get_mut(id)?;
        let statistics = lifecycle::complete(task, outcome)?;
        info!(task = %id, name = %task.name, status = %task.status, "task finished");
        events.push(event);

        if task.status.is_unsuccessful() {
            let sweep = self.registry.cancel_dependents(id)?;
            self.apply_sweep(sweep, events);
        }

        Ok(statistics)
    }
}

/// Creates, wires, runs and cancels backup tasks.
///
/// Share it behind an `Arc` to drive executions from several tasks; the
/// `max_workers` bound applies across all of them.
pub struct TaskManager {
    state: Mutex<ManagerState>,
    /// Bumped on every registry change that can unblock a waiting execution.
    changes: watch::Sender<u64>,
    pub(crate) backend: Arc<dyn crate::exec::BackupBackend>,
    sink: Arc<dyn EventSink>,
    aggregator: Option<Arc<StatisticsAggregator>>,
    pub(crate) options: ManagerOptions,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("options", &self.options)
            .field("tasks", &self.lock().registry.len())
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    pub fn new(
        backend: Arc<dyn crate::exec::BackupBackend>,
        sink: Arc<dyn EventSink>,
        options: ManagerOptions,
    ) -> Self {
        let mut options = options;
        if options.max_workers == 0 {
            warn!("max_workers must be at least 1; using 1");
            options.max_workers = 1;
        }

        let (changes, _) = watch::channel(0);
        Self {
            state: Mutex::new(ManagerState {
                registry: TaskRegistry::new(),
                aborts: HashMap::new(),
            }),
            changes,
            backend,
            sink,
            aggregator: None,
            options,
        }
    }

    /// Forward the statistics of every successful task to `aggregator`.
    pub fn with_aggregator(mut self, aggregator: Arc<StatisticsAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn options(&self) -> ManagerOptions {
        self.options
    }

    pub fn aggregator(&self) -> Option<&Arc<StatisticsAggregator>> {
        self.aggregator.as_ref()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn notify_changed(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub(crate) fn publish_all(&self, events: Vec<TaskEvent>) {
        for event in events {
            self.sink.publish(event);
        }
    }

    pub(crate) fn forward_statistics(&self, task: TaskId, statistics: &BackupStatistics) {
        let Some(aggregator) = &self.aggregator else {
            return;
        };
        if let Err(err) = aggregator.store_statistics(statistics) {
            warn!(task = %task, error = %err, "failed to store backup statistics");
            self.sink.publish(TaskEvent::StatisticsError {
                task: Some(task),
                error: err.to_string(),
            });
        }
    }

    /// Validate `spec` and register a new `Created` task.
    pub fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        if let Err(err) = spec.validate() {
            warn!(name = %spec.name, error = %err, "rejected task spec");
            self.sink.publish(TaskEvent::ValidationFailed {
                error: err.to_string(),
            });
            return Err(err);
        }

        let task = Task::from_spec(spec);
        self.lock().registry.insert(task.clone())?;
        info!(task = %task.id, name = %task.name, "task created");

        self.sink.publish(TaskEvent::TaskCreated {
            task: task.id,
            name: task.name.clone(),
        });
        Ok(task)
    }

    /// Make `task` wait for every task in `dependencies`.
    ///
    /// All edges are added or none is. An edge that would close a cycle is
    /// reported as `dependency-cycle-rejected`.
    pub fn add_task_dependencies(&self, task: TaskId, dependencies: &[TaskId]) -> Result<()> {
        let result = self.lock().registry.add_dependencies(task, dependencies);

        match result {
            Ok(()) => {
                debug!(task = %task, count = dependencies.len(), "dependencies added");
                self.notify_changed();
                Ok(())
            }
            Err(BackupError::CircularDependency { task, depends_on }) => {
                warn!(task = %task, depends_on = %depends_on, "rejected dependency: would create a cycle");
                self.sink
                    .publish(TaskEvent::DependencyCycleRejected { task, depends_on });
                Err(BackupError::CircularDependency { task, depends_on })
            }
            Err(err) => Err(err),
        }
    }

    /// Cancel `id` and every task that transitively depends on it.
    ///
    /// Tasks that have not started are cancelled immediately; running ones
    /// are asked to abort and turn `Cancelled` once their executor reports
    /// back. Returns the affected tasks; cancelling a terminal task is a
    /// no-op that returns nothing.
    pub fn cancel_task(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut events = Vec::new();

        let affected = {
            let mut state = self.lock();
            let task = state.registry.get_mut(id)?;

            let mut affected = vec![id];
            match lifecycle::cancel(task) {
                CancelAction::AlreadyTerminal => {
                    debug!(task = %id, status = %task.status, "cancel on terminal task ignored");
                    return Ok(Vec::new());
                }
                CancelAction::Cancelled => {
                    info!(task = %id, "task cancelled");
                    events.push(TaskEvent::TaskCancelled {
                        task: id,
                        reason: CancelReason::Requested,
                    });
                }
                CancelAction::AbortRequested => {
                    info!(task = %id, "cancelling running task");
                    state.request_abort(id, &mut events);
                }
            }

            let sweep = state.registry.cancel_dependents(id)?;
            affected.extend(state.apply_sweep(sweep, &mut events));
            affected
        };

        self.notify_changed();
        self.publish_all(events);
        Ok(affected)
    }

    pub fn get_task_status(&self, id: TaskId) -> Result<TaskStatus> {
        self.lock().registry.status(id)
    }

    pub fn get_task_progress(&self, id: TaskId) -> Result<f64> {
        self.lock().registry.get(id).map(|t| t.progress)
    }

    /// Snapshot of one task.
    pub fn task(&self, id: TaskId) -> Result<Task> {
        self.lock().registry.get(id).cloned()
    }

    /// Snapshot of all tasks, in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().registry.tasks().into_iter().cloned().collect()
    }

    /// Forget a terminal task.
    pub fn purge_task(&self, id: TaskId) -> Result<Task> {
        let task = self.lock().registry.remove(id)?;
        debug!(task = %id, "task purged");
        Ok(task)
    }

    /// Forget every terminal task; returns the purged ids.
    pub fn purge_terminal(&self) -> Vec<TaskId> {
        let mut state = self.lock();
        let terminal: Vec<TaskId> = state
            .registry
            .tasks()
            .into_iter()
            .filter(|t| t.is_terminal())
            .map(|t| t.id)
            .collect();

        terminal
            .into_iter()
            .filter(|id| state.registry.remove(*id).is_ok())
            .collect()
    }
}
