use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backupdag::errors::BackupError;
use backupdag::exec::{BackendEvent, BackendFuture, BackupBackend, ScheduledBackup};
use backupdag::task::TaskId;
use tokio::sync::mpsc;

use crate::builders::stats;

/// How the fake backend behaves for one task name.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Report each progress value in order, then succeed with `size` bytes.
    Succeed { progress: Vec<f64>, size: u64 },
    /// Fail immediately with the given detail.
    Fail(String),
    /// Refuse to start: `execute` itself returns an error.
    Reject(String),
    /// Succeed with `size` bytes after `delay`.
    Delayed { delay: Duration, size: u64 },
    /// Never finish on its own; acknowledges aborts.
    Hang,
    /// Never finish and never acknowledge an abort.
    IgnoreAbort,
    /// Close the event stream without a terminal event.
    CloseEarly,
    /// `execute` itself never resolves.
    NeverStart,
}

impl Script {
    pub fn succeed(size: u64) -> Self {
        Script::Succeed {
            progress: vec![0.5],
            size,
        }
    }

    pub fn fail(detail: &str) -> Self {
        Script::Fail(detail.to_string())
    }

    pub fn delayed(ms: u64) -> Self {
        Script::Delayed {
            delay: Duration::from_millis(ms),
            size: 1,
        }
    }
}

#[derive(Debug, Default)]
struct BackendLog {
    executed: Mutex<Vec<String>>,
    aborted: Mutex<Vec<TaskId>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl BackendLog {
    fn started(&self, name: &str) {
        self.executed.lock().unwrap().push(name.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
    }

    fn finished(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A backend that plays a [`Script`] per task name and records:
/// - which tasks were executed, in order
/// - which tasks were asked to abort
/// - the highest number of backups in flight at once
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    default_script: Script,
    log: Arc<BackendLog>,
    /// Streams of hanging tasks, kept open until aborted.
    hanging: Mutex<HashMap<TaskId, (mpsc::Sender<BackendEvent>, bool)>>,
}

impl ScriptedBackend {
    /// Every task succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_default(Script::succeed(1))
    }

    pub fn with_default(default_script: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_script,
            log: Arc::new(BackendLog::default()),
            hanging: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, name: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), script);
        self
    }

    /// Task names in the order `execute` was called.
    pub fn executed(&self) -> Vec<String> {
        self.log.executed.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> Vec<TaskId> {
        self.log.aborted.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.log.max_running.load(Ordering::SeqCst)
    }

    fn script_for(&self, name: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone())
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupBackend for ScriptedBackend {
    fn execute(&self, job: ScheduledBackup) -> BackendFuture<'_, mpsc::Receiver<BackendEvent>> {
        Box::pin(async move {
            let script = self.script_for(&job.name);
            match &script {
                Script::Reject(detail) => return Err(BackupError::Backend(detail.clone())),
                Script::NeverStart => {
                    self.log.executed.lock().unwrap().push(job.name.clone());
                    return std::future::pending().await;
                }
                _ => {}
            }

            self.log.started(&job.name);
            let (tx, rx) = mpsc::channel(16);
            let log = Arc::clone(&self.log);
            let repository = job.parameters.repository_id.clone();

            match script {
                Script::Succeed { progress, size } => {
                    tokio::spawn(async move {
                        for value in progress {
                            let _ = tx.send(BackendEvent::Progress(value)).await;
                        }
                        let _ = tx
                            .send(BackendEvent::Succeeded(stats(&repository, size)))
                            .await;
                        log.finished();
                    });
                }
                Script::Fail(detail) => {
                    tokio::spawn(async move {
                        let _ = tx.send(BackendEvent::Failed(detail)).await;
                        log.finished();
                    });
                }
                Script::Delayed { delay, size } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx
                            .send(BackendEvent::Succeeded(stats(&repository, size)))
                            .await;
                        log.finished();
                    });
                }
                Script::Hang => {
                    self.hanging.lock().unwrap().insert(job.task_id, (tx, false));
                }
                Script::IgnoreAbort => {
                    self.hanging.lock().unwrap().insert(job.task_id, (tx, true));
                }
                Script::CloseEarly => {
                    drop(tx);
                    log.finished();
                }
                Script::Reject(_) | Script::NeverStart => unreachable!("handled above"),
            }

            Ok(rx)
        })
    }

    fn abort(&self, task: TaskId) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.log.aborted.lock().unwrap().push(task);

            let hanging = self.hanging.lock().unwrap().remove(&task);
            if let Some((_tx, ignore)) = hanging {
                self.log.finished();
                if ignore {
                    std::future::pending::<()>().await;
                }
            }
            Ok(())
        })
    }
}
