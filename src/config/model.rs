// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::engine::ManagerOptions;
use crate::monitor::{BackupMonitor, FilterRule};
use crate::store::{FileStore, MemoryStore, RecordStore};
use crate::task::{BackupParameters, TaskSpec};

/// Plan file exactly as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// max_workers = 2
///
/// [store]
/// path = "/var/lib/backupdag"
///
/// [task.documents]
/// repository = "nas"
/// paths = ["/home/me/Documents"]
///
/// [task.photos]
/// repository = "nas"
/// paths = ["/home/me/Pictures"]
/// exclude = ["**/*.tmp"]
/// after = ["documents"]
///
/// [monitor.home]
/// repository = "nas"
/// include = ["/home/me/**"]
/// ```
///
/// All sections except `[task.*]` are optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPlanFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub store: StoreSection,

    /// Keys are the task names.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    #[serde(default)]
    pub monitor: BTreeMap<String, MonitorConfig>,
}

/// Validated plan. Construct it with `PlanFile::try_from(raw)` (see
/// `validate.rs`) or through `loader::load_and_validate`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub engine: EngineSection,
    pub store: StoreSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub monitor: BTreeMap<String, MonitorConfig>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(raw: RawPlanFile) -> Self {
        Self {
            engine: raw.engine,
            store: raw.store,
            task: raw.task,
            monitor: raw.monitor,
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            max_workers: self.engine.max_workers,
            cancel_timeout: Duration::from_secs(self.engine.cancel_timeout_secs),
        }
    }

    /// Task specs keyed by task name.
    pub fn task_specs(&self) -> BTreeMap<&str, TaskSpec> {
        self.task
            .iter()
            .map(|(name, cfg)| (name.as_str(), cfg.to_spec(name)))
            .collect()
    }

    /// Build the configured monitors. A monitor whose interval is too short
    /// keeps the default interval.
    pub fn monitors(&self) -> crate::errors::Result<Vec<BackupMonitor>> {
        self.monitor
            .iter()
            .map(|(name, cfg)| {
                let mut monitor = BackupMonitor::new(name.clone(), cfg.repository.clone());
                monitor.set_active(cfg.active);
                if !monitor.set_check_interval(cfg.check_interval) {
                    warn!(
                        monitor = %name,
                        requested = cfg.check_interval,
                        used = monitor.check_interval(),
                        "check_interval below minimum; keeping default"
                    );
                }
                monitor.set_filters(cfg.filter_rules())?;
                Ok(monitor)
            })
            .collect()
    }

    /// Open the configured record store; in memory when no path is set.
    pub fn open_store(&self) -> Arc<dyn RecordStore> {
        match &self.store.path {
            Some(path) => Arc::new(FileStore::new(path.clone())),
            None => Arc::new(MemoryStore::new()),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Upper bound on concurrently running backups.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Seconds a running backup may take to acknowledge an abort.
    #[serde(default = "default_cancel_timeout_secs")]
    pub cancel_timeout_secs: u64,
}

fn default_max_workers() -> usize {
    crate::engine::DEFAULT_MAX_WORKERS
}

fn default_cancel_timeout_secs() -> u64 {
    crate::engine::DEFAULT_CANCEL_TIMEOUT.as_secs()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            cancel_timeout_secs: default_cancel_timeout_secs(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// Directory for statistics records. Records stay in memory if unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub repository: String,

    pub paths: Vec<PathBuf>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// This task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,
}

impl TaskConfig {
    pub fn to_spec(&self, name: &str) -> TaskSpec {
        let mut parameters = BackupParameters::new(self.repository.clone(), self.paths.clone());
        parameters.excludes = self.exclude.clone();
        parameters.tags = self.tags.clone();
        TaskSpec::new(name, parameters)
    }
}

/// `[monitor.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    pub repository: String,

    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Include globs. `exclude` is checked first.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_check_interval() -> u64 {
    crate::monitor::DEFAULT_CHECK_INTERVAL_SECS
}

fn default_active() -> bool {
    true
}

impl MonitorConfig {
    /// Excludes are checked first so that an excluded path under an included
    /// directory stays out.
    pub fn filter_rules(&self) -> Vec<FilterRule> {
        self.exclude
            .iter()
            .cloned()
            .map(FilterRule::Exclude)
            .chain(self.include.iter().cloned().map(FilterRule::Include))
            .collect()
    }
}
