// src/engine/runtime.rs

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::events::TaskEvent;
use crate::engine::{RuntimeEvent, TaskManager};
use crate::errors::Result;
use crate::exec::lifecycle::{self, ExecutionOutcome};
use crate::exec::TaskExecutor;
use crate::task::{TaskId, TaskStatus};

const RUNTIME_CHANNEL_CAPACITY: usize = 64;

/// What an `execute_*` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Tasks this call started, in start order.
    pub started: Vec<TaskId>,
    /// Final status of every task in the executed scope, in topological
    /// order.
    pub statuses: Vec<(TaskId, TaskStatus)>,
}

impl ExecutionReport {
    pub fn status_of(&self, task: TaskId) -> Option<TaskStatus> {
        self.statuses
            .iter()
            .find(|(id, _)| *id == task)
            .map(|(_, status)| *status)
    }

    pub fn all_succeeded(&self) -> bool {
        self.statuses
            .iter()
            .all(|(_, status)| *status == TaskStatus::Succeeded)
    }
}

/// Tasks whose executors report to one execution loop.
///
/// If the loop goes away early (its future dropped, or an error), the tasks
/// it still owns could never complete, so they are aborted and force-cancelled.
struct OwnedExecutions<'a> {
    manager: &'a TaskManager,
    ids: HashSet<TaskId>,
}

impl Drop for OwnedExecutions<'_> {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        warn!(tasks = self.ids.len(), "execution abandoned with tasks still running; cancelling them");

        let mut events = Vec::new();
        {
            let mut state = self.manager.lock();
            for id in self.ids.drain() {
                if let Some(Some(tx)) = state.aborts.remove(&id) {
                    let _ = tx.send(());
                }
                if let Err(err) = state.finish(id, ExecutionOutcome::Cancelled { forced: true }, &mut events) {
                    debug!(task = %id, error = %err, "abandoned task already finished");
                }
            }
        }

        self.manager.notify_changed();
        self.manager.publish_all(events);
    }
}

impl TaskManager {
    /// Run `id` after everything it transitively depends on.
    ///
    /// Resolves once every task in that scope is terminal. Task failures are
    /// reported in the returned statuses and as events, not as an error.
    pub async fn execute_task(&self, id: TaskId) -> Result<ExecutionReport> {
        self.lock().registry.get(id)?;
        self.run_scope(vec![id]).await
    }

    /// Run every task known at call time, in dependency order.
    pub async fn execute_all(&self) -> Result<ExecutionReport> {
        let roots = self.lock().registry.graph().tasks();
        self.run_scope(roots).await
    }

    async fn run_scope(&self, roots: Vec<TaskId>) -> Result<ExecutionReport> {
        let mut changes = self.subscribe();
        let (tx, mut rx) = mpsc::channel(RUNTIME_CHANNEL_CAPACITY);
        let mut owned = OwnedExecutions {
            manager: self,
            ids: HashSet::new(),
        };
        let mut started = Vec::new();

        info!(roots = roots.len(), "executing tasks");

        let scope = loop {
            let mut events = Vec::new();

            let (scope, done) = {
                let mut state = self.lock();

                // Dependencies may be added while we run, so the scope is
                // recomputed every round.
                let live: Vec<TaskId> = roots
                    .iter()
                    .copied()
                    .filter(|id| state.registry.graph().contains(*id))
                    .collect();
                let scope = state.registry.graph().topological_order_for(&live)?;
                state.registry.enqueue_all(&scope)?;

                let sweep = state.registry.cancel_blocked(&scope)?;
                state.apply_sweep(sweep, &mut events);

                let limit = self
                    .options
                    .max_workers
                    .saturating_sub(state.registry.running_count());

                for job in state.registry.start_ready(&scope, limit) {
                    let (cancel_tx, cancel_rx) = oneshot::channel();
                    state.aborts.insert(job.task_id, Some(cancel_tx));
                    owned.ids.insert(job.task_id);
                    started.push(job.task_id);
                    events.push(TaskEvent::TaskStarted {
                        task: job.task_id,
                        name: job.name.clone(),
                    });

                    let executor = TaskExecutor::new(
                        job,
                        Arc::clone(&self.backend),
                        tx.clone(),
                        self.options.cancel_timeout,
                    );
                    tokio::spawn(executor.run(cancel_rx));
                }

                changes.borrow_and_update();

                let done = owned.ids.is_empty()
                    && scope
                        .iter()
                        .all(|id| state.registry.status(*id).map_or(true, TaskStatus::is_terminal));
                (scope, done)
            };

            self.publish_all(events);

            if done {
                break scope;
            }

            tokio::select! {
                event = rx.recv(), if !owned.ids.is_empty() => {
                    if let Some(event) = event {
                        self.apply_runtime_event(event, &mut owned.ids);
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("change notifier closed");
                    }
                }
            }
        };

        let statuses: Vec<(TaskId, TaskStatus)> = {
            let state = self.lock();
            scope
                .iter()
                .filter_map(|id| state.registry.status(*id).ok().map(|s| (*id, s)))
                .collect()
        };

        let succeeded = statuses
            .iter()
            .filter(|(_, s)| *s == TaskStatus::Succeeded)
            .count();
        info!(tasks = statuses.len(), succeeded, started = started.len(), "execution finished");

        Ok(ExecutionReport { started, statuses })
    }

    fn apply_runtime_event(&self, event: RuntimeEvent, owned: &mut HashSet<TaskId>) {
        let mut events = Vec::new();
        let mut forward = None;
        let mut completed = false;

        {
            let mut state = self.lock();
            match event {
                RuntimeEvent::Progress { task, value } => {
                    match state
                        .registry
                        .get_mut(task)
                        .and_then(|t| lifecycle::update_progress(t, value))
                    {
                        Ok(progress) => events.push(TaskEvent::TaskProgress { task, progress }),
                        Err(err) => debug!(task = %task, error = %err, "progress report ignored"),
                    }
                }
                RuntimeEvent::Completed { task, outcome } => {
                    owned.remove(&task);
                    completed = true;
                    match state.finish(task, outcome, &mut events) {
                        Ok(Some(statistics)) => forward = Some((task, statistics)),
                        Ok(None) => {}
                        Err(err) => debug!(task = %task, error = %err, "completion report ignored"),
                    }
                }
            }
        }

        if completed {
            self.notify_changed();
        }
        self.publish_all(events);

        if let Some((task, statistics)) = forward {
            self.forward_statistics(task, &statistics);
        }
    }
}
