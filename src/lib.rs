// src/lib.rs

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod monitor;
pub mod stats;
pub mod store;
pub mod task;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

pub use crate::engine::{
    CancelReason, ChannelSink, EventSink, ExecutionReport, ManagerOptions, TaskEvent,
    TaskManager, TracingSink,
};
pub use crate::errors::{BackupError, Result};
pub use crate::exec::{BackendEvent, BackendFuture, BackupBackend, ScheduledBackup};
pub use crate::stats::{BackupStatistics, StatisticsAggregator};
pub use crate::task::{BackupParameters, Task, TaskId, TaskSpec, TaskStatus};

/// High-level entry point: load the plan at `path`, create its tasks and run
/// all of them against `backend`.
///
/// Statistics of successful tasks go to the plan's `[store]`.
pub async fn run_plan(
    path: impl AsRef<Path>,
    backend: Arc<dyn BackupBackend>,
    sink: Arc<dyn EventSink>,
) -> Result<ExecutionReport> {
    let path = path.as_ref();
    let plan = config::load_and_validate(path)?;
    info!(path = %path.display(), tasks = plan.task.len(), "loaded backup plan");

    let manager = engine::plan::build_manager(&plan, backend, sink);
    engine::plan::instantiate(&manager, &plan)?;
    manager.execute_all().await
}
