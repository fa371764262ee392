pub mod builders;
pub mod fake_backend;
pub mod recording_sink;

use std::sync::Once;
use std::time::Duration;

use backupdag::engine::TaskManager;
use backupdag::task::{TaskId, TaskStatus};
use tracing_subscriber::{EnvFilter, fmt};

pub use fake_backend::{Script, ScriptedBackend};
pub use recording_sink::RecordingSink;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll until `task` reaches `status`.
pub async fn wait_for_status(manager: &TaskManager, task: TaskId, status: TaskStatus) {
    with_timeout(async {
        while manager.get_task_status(task).expect("task exists") != status {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
