#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use backupdag::engine::{ManagerOptions, TaskManager};
use backupdag::task::TaskId;

pub use backupdag_test_utils::builders;
pub use backupdag_test_utils::{
    RecordingSink, Script, ScriptedBackend, init_tracing, wait_for_status, with_timeout,
};

/// A manager wired to a scripted backend and a recording sink.
pub struct Harness {
    pub manager: TaskManager,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with_options(backend, ManagerOptions::default())
    }

    pub fn with_options(backend: ScriptedBackend, options: ManagerOptions) -> Self {
        init_tracing();
        let backend = Arc::new(backend);
        let sink = Arc::new(RecordingSink::new());
        let manager = TaskManager::new(backend.clone(), sink.clone(), options);
        Self {
            manager,
            backend,
            sink,
        }
    }

    /// Create a task from the default spec for `name`.
    pub fn add(&self, name: &str) -> TaskId {
        self.manager
            .create_task(builders::spec(name))
            .expect("valid spec")
            .id
    }

    /// Create a task that depends on `deps`.
    pub fn add_after(&self, name: &str, deps: &[TaskId]) -> TaskId {
        let id = self.add(name);
        self.manager
            .add_task_dependencies(id, deps)
            .expect("acyclic dependency");
        id
    }
}

pub fn options(max_workers: usize, cancel_timeout_ms: u64) -> ManagerOptions {
    ManagerOptions {
        max_workers,
        cancel_timeout: Duration::from_millis(cancel_timeout_ms),
    }
}
