// src/engine/plan.rs

//! Turn a validated plan file into tasks on a manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::PlanFile;
use crate::engine::{EventSink, TaskManager};
use crate::errors::{BackupError, Result};
use crate::exec::BackupBackend;
use crate::stats::StatisticsAggregator;
use crate::task::TaskId;

/// Create every task of `plan` on `manager`, then wire the `after` edges.
///
/// Tasks are created in name order. Returns the id assigned to each name.
pub fn instantiate(manager: &TaskManager, plan: &PlanFile) -> Result<BTreeMap<String, TaskId>> {
    let mut ids = BTreeMap::new();
    for (name, spec) in plan.task_specs() {
        let task = manager.create_task(spec)?;
        ids.insert(name.to_string(), task.id);
    }

    for (name, cfg) in plan.task.iter() {
        if cfg.after.is_empty() {
            continue;
        }
        let lookup = |n: &String| {
            ids.get(n)
                .copied()
                .ok_or_else(|| BackupError::Config(format!("unknown task '{n}'")))
        };
        let task = lookup(name)?;
        let deps = cfg.after.iter().map(lookup).collect::<Result<Vec<_>>>()?;
        manager.add_task_dependencies(task, &deps)?;
    }

    info!(tasks = ids.len(), "plan instantiated");
    Ok(ids)
}

/// A manager configured from `plan`, with statistics going to the plan's
/// store.
pub fn build_manager(
    plan: &PlanFile,
    backend: Arc<dyn BackupBackend>,
    sink: Arc<dyn EventSink>,
) -> TaskManager {
    let aggregator = StatisticsAggregator::new(plan.open_store());
    TaskManager::new(backend, sink, plan.manager_options()).with_aggregator(Arc::new(aggregator))
}
