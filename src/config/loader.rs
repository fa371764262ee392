// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Read a plan file and return the raw, unvalidated `RawPlanFile`.
///
/// Use [`load_and_validate`] for the checked version.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read plan file");

    let plan: RawPlanFile = toml::from_str(&contents)?;
    Ok(plan)
}

/// Load a plan file from path and validate it:
///
/// - at least one task,
/// - sane `[engine]` values,
/// - valid task parameters and monitor filters,
/// - known `after` references and no cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    PlanFile::try_from(raw)
}

/// Parse and validate a plan held in memory.
pub fn parse_plan(contents: &str) -> Result<PlanFile> {
    let raw: RawPlanFile = toml::from_str(contents)?;
    PlanFile::try_from(raw)
}
