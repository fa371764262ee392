// src/config/validate.rs

use std::collections::HashMap;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::dag::DependencyGraph;
use crate::errors::{BackupError, Result};
use crate::monitor::FilterSet;
use crate::task::TaskId;

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = BackupError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw))
    }
}

fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_engine(plan)?;
    validate_tasks(plan)?;
    validate_dependencies(plan)?;
    validate_monitors(plan)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(BackupError::Config(
            "plan must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(plan: &RawPlanFile) -> Result<()> {
    if plan.engine.max_workers == 0 {
        return Err(BackupError::Config(
            "[engine].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if plan.engine.cancel_timeout_secs == 0 {
        return Err(BackupError::Config(
            "[engine].cancel_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(plan: &RawPlanFile) -> Result<()> {
    for (name, task) in plan.task.iter() {
        task.to_spec(name)
            .validate()
            .map_err(|err| BackupError::Config(format!("task '{name}': {err}")))?;
    }
    Ok(())
}

/// Wire `after` edges into a `DependencyGraph`. Unknown, self and cyclic
/// edges are rejected.
fn validate_dependencies(plan: &RawPlanFile) -> Result<()> {
    let mut graph = DependencyGraph::new();
    let ids: HashMap<&str, TaskId> = plan
        .task
        .keys()
        .map(|name| (name.as_str(), TaskId::new()))
        .collect();
    for id in ids.values() {
        graph.add_task(*id)?;
    }

    for (name, task) in plan.task.iter() {
        let mut deps = Vec::with_capacity(task.after.len());
        for dep in task.after.iter() {
            if dep == name {
                return Err(BackupError::Config(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            let Some(id) = ids.get(dep.as_str()) else {
                return Err(BackupError::Config(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            };
            deps.push(*id);
        }

        graph
            .add_dependencies(ids[name.as_str()], &deps)
            .map_err(|err| match err {
                BackupError::CircularDependency { .. } => BackupError::CycleDetected(format!(
                    "cycle detected in task DAG involving task '{name}'"
                )),
                other => other,
            })?;
    }
    Ok(())
}

fn validate_monitors(plan: &RawPlanFile) -> Result<()> {
    for (name, monitor) in plan.monitor.iter() {
        if monitor.repository.trim().is_empty() {
            return Err(BackupError::Config(format!(
                "monitor '{name}' must name a repository"
            )));
        }
        FilterSet::compile(&monitor.filter_rules())
            .map_err(|err| BackupError::Config(format!("monitor '{name}': {err}")))?;
    }
    Ok(())
}
