// src/exec/mod.rs

//! Execution layer.
//!
//! - [`backend`] defines the `BackupBackend` contract the engine consumes.
//! - [`lifecycle`] holds the synchronous status/progress transitions of a
//!   single task.
//! - [`executor`] owns the async conversation with the backend for one
//!   running task and reports back via `RuntimeEvent`s.

pub mod backend;
pub mod executor;
pub mod lifecycle;

pub use backend::{BackendEvent, BackendFuture, BackupBackend, ScheduledBackup};
pub use executor::TaskExecutor;
pub use lifecycle::{CancelAction, ExecutionOutcome};
