// tests/plan_loading.rs

mod common;
use crate::common::builders::PlanBuilder;
use crate::common::{RecordingSink, Script, ScriptedBackend, init_tracing, with_timeout};

use std::error::Error;
use std::fs;
use std::sync::Arc;

use backupdag::config::{load_and_validate, parse_plan};
use backupdag::engine::plan::{build_manager, instantiate};
use backupdag::errors::BackupError;
use backupdag::run_plan;
use backupdag::store::{FileStore, RecordStore};
use backupdag::task::TaskStatus;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn run_plan_executes_every_task_and_stores_statistics() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let store_dir = dir.path().join("records");
    let plan_path = dir.path().join("Backupdag.toml");

    let toml = PlanBuilder::new()
        .max_workers(2)
        .store_path(&store_dir)
        .task("documents", &[])
        .task("photos", &["documents"])
        .task("music", &[])
        .to_toml();
    fs::write(&plan_path, toml)?;

    let backend = Arc::new(ScriptedBackend::new());
    let sink = Arc::new(RecordingSink::new());
    let report = with_timeout(run_plan(&plan_path, backend.clone(), sink.clone())).await?;

    assert!(report.all_succeeded());
    assert_eq!(report.statuses.len(), 3);

    let executed = backend.executed();
    let position = |name: &str| executed.iter().position(|n| n == name);
    assert!(position("documents") < position("photos"));

    let keys = FileStore::new(&store_dir).keys("statistics/nas/")?;
    assert_eq!(keys.len(), 3);
    assert_eq!(sink.count("task-succeeded"), 3);
    Ok(())
}

#[tokio::test]
async fn failing_plan_task_cancels_its_dependents() -> TestResult {
    let plan = PlanBuilder::new()
        .task("base", &[])
        .task("incremental", &["base"])
        .build();

    let backend = Arc::new(ScriptedBackend::new().script("base", Script::fail("repository locked")));
    let sink = Arc::new(RecordingSink::new());
    let manager = build_manager(&plan, backend, sink.clone());
    let ids = instantiate(&manager, &plan)?;

    let report = with_timeout(manager.execute_all()).await?;

    assert_eq!(report.status_of(ids["base"]), Some(TaskStatus::Failed));
    assert_eq!(report.status_of(ids["incremental"]), Some(TaskStatus::Cancelled));
    Ok(())
}

#[test]
fn cyclic_plan_is_rejected_before_anything_runs() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("cycle.toml");
    fs::write(
        &path,
        PlanBuilder::new()
            .task("a", &["c"])
            .task("b", &["a"])
            .task("c", &["b"])
            .to_toml(),
    )?;

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, BackupError::CycleDetected(_)));
    Ok(())
}

#[test]
fn plan_sections_map_onto_engine_options_and_monitors() -> TestResult {
    let plan = parse_plan(
        r#"
        [engine]
        max_workers = 3
        cancel_timeout_secs = 5

        [task.docs]
        repository = "nas"
        paths = ["/home/me/Documents"]
        exclude = ["**/*.tmp"]
        tags = ["daily"]

        [monitor.home]
        repository = "nas"
        check_interval = 120
        include = ["/home/me/**"]
        exclude = ["**/.cache/**"]
        "#,
    )?;

    let options = plan.manager_options();
    assert_eq!(options.max_workers, 3);
    assert_eq!(options.cancel_timeout.as_secs(), 5);

    let specs = plan.task_specs();
    assert_eq!(specs["docs"].parameters.excludes, vec!["**/*.tmp".to_string()]);
    assert_eq!(specs["docs"].parameters.tags, vec!["daily".to_string()]);

    let monitors = plan.monitors()?;
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].check_interval(), 120);
    assert!(monitors[0].matches(std::path::Path::new("/home/me/notes.md")));
    assert!(!monitors[0].matches(std::path::Path::new("/home/me/.cache/x")));
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() {
    let result = parse_plan(
        r#"
        [task.docs]
        repository = "nas"
        paths = ["/data"]
        retries = 3
        "#,
    );
    assert!(matches!(result, Err(BackupError::Toml(_))));
}

#[tokio::test]
async fn missing_plan_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = run_plan(
        dir.path().join("absent.toml"),
        Arc::new(ScriptedBackend::new()),
        Arc::new(RecordingSink::new()),
    )
    .await;
    assert!(matches!(result, Err(BackupError::Io(_))));
}
