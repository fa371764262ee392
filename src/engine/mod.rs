// src/engine/mod.rs

//! Orchestration engine for backupdag.
//!
//! This module ties together:
//! - the task manager, which owns the registry and the public API
//! - the execution loop that starts ready tasks and applies executor reports
//! - event publishing to an [`EventSink`]
//! - plan instantiation from a loaded config file
//!
//! Synchronous state changes live in [`crate::dag`] and
//! [`crate::exec::lifecycle`]; [`runtime`] is the async shell around them.

use std::time::Duration;

use crate::exec::ExecutionOutcome;
use crate::task::TaskId;

pub mod events;
pub mod manager;
pub mod plan;
pub mod runtime;

pub use events::{CancelReason, ChannelSink, EventSink, TaskEvent, TracingSink};
pub use manager::TaskManager;
pub use runtime::ExecutionReport;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs of a [`TaskManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Upper bound on concurrently running tasks, across all callers.
    pub max_workers: usize,
    /// How long a running task may take to acknowledge an abort.
    pub cancel_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
        }
    }
}

/// Events flowing from executors into the execution loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The backend reported progress for a running task.
    Progress { task: TaskId, value: f64 },
    /// A task's executor finished with a terminal outcome.
    Completed {
        task: TaskId,
        outcome: ExecutionOutcome,
    },
}
