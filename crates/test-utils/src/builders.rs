#![allow(dead_code)]

use std::path::PathBuf;

use backupdag::config::{PlanFile, parse_plan};
use backupdag::stats::BackupStatistics;
use backupdag::task::{BackupParameters, TaskSpec};
use chrono::Utc;

/// A valid spec for repository `nas` backing up `/data/<name>`.
pub fn spec(name: &str) -> TaskSpec {
    TaskSpecBuilder::new(name).build()
}

/// Statistics for `size` bytes in one file with a 0.5 ratio.
pub fn stats(repository: &str, size: u64) -> BackupStatistics {
    BackupStatistics::new(repository, size, 1, 0.5, Utc::now())
        .expect("0.5 is a valid deduplication ratio")
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    name: String,
    parameters: BackupParameters,
}

impl TaskSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: BackupParameters::new("nas", vec![PathBuf::from(format!("/data/{name}"))]),
        }
    }

    pub fn repository(mut self, repository: &str) -> Self {
        self.parameters.repository_id = repository.to_string();
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.parameters.paths.push(PathBuf::from(path));
        self
    }

    pub fn no_paths(mut self) -> Self {
        self.parameters.paths.clear();
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.parameters.excludes.push(pattern.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.parameters.tags.push(tag.to_string());
        self
    }

    pub fn build(self) -> TaskSpec {
        TaskSpec::new(self.name, self.parameters)
    }
}

/// Builds plan-file TOML.
#[derive(Default)]
pub struct PlanBuilder {
    max_workers: Option<usize>,
    cancel_timeout_secs: Option<u64>,
    store_path: Option<PathBuf>,
    tasks: Vec<(String, Vec<String>)>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = Some(n);
        self
    }

    pub fn cancel_timeout_secs(mut self, secs: u64) -> Self {
        self.cancel_timeout_secs = Some(secs);
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn task(mut self, name: &str, after: &[&str]) -> Self {
        self.tasks.push((
            name.to_string(),
            after.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        if self.max_workers.is_some() || self.cancel_timeout_secs.is_some() {
            out.push_str("[engine]\n");
            if let Some(n) = self.max_workers {
                out.push_str(&format!("max_workers = {n}\n"));
            }
            if let Some(secs) = self.cancel_timeout_secs {
                out.push_str(&format!("cancel_timeout_secs = {secs}\n"));
            }
            out.push('\n');
        }

        if let Some(path) = &self.store_path {
            out.push_str(&format!("[store]\npath = {:?}\n\n", path.display().to_string()));
        }

        for (name, after) in &self.tasks {
            out.push_str(&format!("[task.{name}]\n"));
            out.push_str("repository = \"nas\"\n");
            out.push_str(&format!("paths = [\"/data/{name}\"]\n"));
            if !after.is_empty() {
                out.push_str(&format!("after = {after:?}\n"));
            }
            out.push('\n');
        }

        out
    }

    pub fn build(self) -> PlanFile {
        parse_plan(&self.to_toml()).expect("Failed to build valid plan from builder")
    }
}
