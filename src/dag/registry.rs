// src/dag/registry.rs

//! Task registry: every known task plus the dependency graph between them.
//!
//! The registry is the single shared mutable resource of a task manager. It
//! is plain data with no locking of its own; the manager serialises access.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::dag::DependencyGraph;
use crate::errors::{BackupError, Result};
use crate::exec::ScheduledBackup;
use crate::exec::lifecycle;
use crate::task::{Task, TaskId, TaskStatus};

/// Tasks touched by a cancellation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelSweep {
    /// Newly `Cancelled` tasks, each with the upstream task that caused it.
    pub cancelled: Vec<(TaskId, TaskId)>,
    /// Running tasks whose backend must be asked to abort.
    pub aborting: Vec<TaskId>,
}

impl CancelSweep {
    pub fn is_empty(&self) -> bool {
        self.cancelled.is_empty() && self.aborting.is_empty()
    }

    fn extend(&mut self, other: CancelSweep) {
        self.cancelled.extend(other.cancelled);
        self.aborting.extend(other.aborting);
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    graph: DependencyGraph,
    tasks: HashMap<TaskId, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn insert(&mut self, task: Task) -> Result<()> {
        self.graph.add_task(task.id)?;
        self.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(BackupError::TaskNotFound(id))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(BackupError::TaskNotFound(id))
    }

    pub fn status(&self, id: TaskId) -> Result<TaskStatus> {
        self.get(id).map(|t| t.status)
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.graph
            .tasks()
            .into_iter()
            .filter_map(|id| self.tasks.get(&id))
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    /// Add dependencies to a task that has not started yet.
    pub fn add_dependencies(&mut self, id: TaskId, deps: &[TaskId]) -> Result<()> {
        let task = self.get(id)?;
        if !matches!(task.status, TaskStatus::Created | TaskStatus::Queued) {
            return Err(BackupError::InvalidState {
                task: id,
                status: task.status,
                operation: "add dependencies to",
            });
        }

        self.graph.add_dependencies(id, deps)?;
        let task = self.get_mut(id)?;
        task.dependencies.extend(deps.iter().copied());
        Ok(())
    }

    /// Remove a terminal task, dropping its edges.
    pub fn remove(&mut self, id: TaskId) -> Result<Task> {
        let task = self.get(id)?;
        if !task.is_terminal() {
            return Err(BackupError::InvalidState {
                task: id,
                status: task.status,
                operation: "purge",
            });
        }

        self.graph.remove_task(id)?;
        for other in self.tasks.values_mut() {
            other.dependencies.remove(&id);
        }
        self.tasks.remove(&id).ok_or(BackupError::TaskNotFound(id))
    }

    /// Current status of every direct dependency of `id`.
    pub fn dependency_statuses(&self, id: TaskId) -> Result<Vec<(TaskId, TaskStatus)>> {
        self.graph
            .dependencies_of(id)?
            .into_iter()
            .map(|dep| self.status(dep).map(|s| (dep, s)))
            .collect()
    }

    /// Mark every not-yet-started task of `scope` as `Queued`.
    pub fn enqueue_all(&mut self, scope: &[TaskId]) -> Result<()> {
        for id in scope {
            let task = self.get_mut(*id)?;
            if task.status == TaskStatus::Created {
                lifecycle::enqueue(task)?;
            }
        }
        Ok(())
    }

    /// Start up to `limit` tasks of `scope` whose dependencies all succeeded.
    ///
    /// `scope` is expected in topological order; ready tasks start in that
    /// order.
    pub fn start_ready(&mut self, scope: &[TaskId], limit: usize) -> Vec<ScheduledBackup> {
        let mut started = Vec::new();

        for id in scope {
            if started.len() >= limit {
                break;
            }

            let Ok(task) = self.get(*id) else { continue };
            if !matches!(task.status, TaskStatus::Created | TaskStatus::Queued) {
                continue;
            }

            let Ok(deps) = self.dependency_statuses(*id) else { continue };
            if deps.iter().any(|(_, s)| *s != TaskStatus::Succeeded) {
                continue;
            }

            let Ok(task) = self.get_mut(*id) else { continue };
            match lifecycle::start(task, &deps) {
                Ok(()) => {
                    info!(task = %task.id, name = %task.name, "dependencies satisfied; starting task");
                    started.push(ScheduledBackup::from_task(task));
                }
                Err(err) => debug!(task = %id, error = %err, "task not startable"),
            }
        }

        started
    }

    /// Cancel every non-terminal task that transitively depends on `root`.
    ///
    /// Tasks that never started are cancelled in place; running ones are
    /// reported in `aborting` for the caller to signal.
    pub fn cancel_dependents(&mut self, root: TaskId) -> Result<CancelSweep> {
        let mut sweep = CancelSweep::default();

        for id in self.graph.transitive_dependents(root)? {
            let Some(task) = self.tasks.get_mut(&id) else { continue };
            match lifecycle::cancel(task) {
                lifecycle::CancelAction::Cancelled => {
                    debug!(task = %id, upstream = %root, "cancelling dependent of unsuccessful task");
                    sweep.cancelled.push((id, root));
                }
                lifecycle::CancelAction::AbortRequested => sweep.aborting.push(id),
                lifecycle::CancelAction::AlreadyTerminal => {}
            }
        }

        Ok(sweep)
    }

    /// Cancel tasks of `scope` that can never run because a dependency
    /// failed or was cancelled, together with everything downstream of them.
    pub fn cancel_blocked(&mut self, scope: &[TaskId]) -> Result<CancelSweep> {
        let mut sweep = CancelSweep::default();

        for id in scope {
            let Ok(task) = self.get(*id) else { continue };
            if task.is_terminal() || task.status == TaskStatus::Running {
                continue;
            }

            let blocker = self
                .dependency_statuses(*id)?
                .into_iter()
                .find(|(_, status)| status.is_unsuccessful());

            if let Some((dependency, _)) = blocker {
                let task = self.get_mut(*id)?;
                if lifecycle::cancel(task) == lifecycle::CancelAction::Cancelled {
                    sweep.cancelled.push((*id, dependency));
                }
                let downstream = self.cancel_dependents(*id)?;
                sweep.extend(downstream);
            }
        }

        Ok(sweep)
    }
}
