// tests/cancellation.rs

mod common;
use crate::common::{Harness, Script, ScriptedBackend, options, wait_for_status, with_timeout};

use std::error::Error;
use std::time::Duration;

use backupdag::engine::{CancelReason, TaskEvent};
use backupdag::task::{TaskId, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn cancel_reason(h: &Harness, task: TaskId) -> Option<CancelReason> {
    h.sink.events().into_iter().find_map(|e| match e {
        TaskEvent::TaskCancelled { task: t, reason } if t == task => Some(reason),
        _ => None,
    })
}

#[tokio::test]
async fn cancel_sweeps_every_dependent_and_nothing_else() -> TestResult {
    let h = Harness::new(ScriptedBackend::new());
    let root = h.add("root");
    let left = h.add_after("left", &[root]);
    let right = h.add_after("right", &[root]);
    let join = h.add_after("join", &[left, right]);
    let unrelated = h.add("unrelated");

    let affected = h.manager.cancel_task(root)?;

    assert_eq!(affected, vec![root, left, right, join]);
    for id in &affected {
        assert_eq!(h.manager.get_task_status(*id)?, TaskStatus::Cancelled);
    }
    assert_eq!(h.manager.get_task_status(unrelated)?, TaskStatus::Created);
    assert_eq!(cancel_reason(&h, root), Some(CancelReason::Requested));
    assert_eq!(
        cancel_reason(&h, join),
        Some(CancelReason::UpstreamUnsuccessful { dependency: root })
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_tasks_are_skipped_by_execution() -> TestResult {
    let h = Harness::new(ScriptedBackend::new());
    let a = h.add("a");
    let b = h.add_after("b", &[a]);
    let other = h.add("other");

    h.manager.cancel_task(a)?;
    let report = with_timeout(h.manager.execute_all()).await?;

    assert_eq!(report.started, vec![other]);
    assert_eq!(report.status_of(b), Some(TaskStatus::Cancelled));
    assert_eq!(h.backend.executed(), vec!["other"]);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_task_aborts_it() -> TestResult {
    let h = Harness::new(ScriptedBackend::new().script("slow", Script::Hang));
    let slow = h.add("slow");
    let next = h.add_after("next", &[slow]);
    let last = h.add_after("last", &[next]);

    let (report, affected) = with_timeout(async {
        tokio::join!(h.manager.execute_all(), async {
            wait_for_status(&h.manager, slow, TaskStatus::Running).await;
            h.manager.cancel_task(slow)
        })
    })
    .await;

    let report = report?;
    assert_eq!(affected?, vec![slow, next, last]);
    assert_eq!(report.status_of(slow), Some(TaskStatus::Cancelled));
    assert_eq!(report.status_of(last), Some(TaskStatus::Cancelled));
    assert_eq!(h.sink.count("task-cancelled"), 3);
    assert_eq!(cancel_reason(&h, slow), Some(CancelReason::Requested));
    assert_eq!(h.backend.aborted(), vec![slow]);
    assert_eq!(h.backend.executed(), vec!["slow"]);
    Ok(())
}

#[tokio::test]
async fn cancel_reaches_a_backend_that_never_starts() -> TestResult {
    let h = Harness::with_options(
        ScriptedBackend::new().script("stalled", Script::NeverStart),
        options(1, 50),
    );
    let stalled = h.add("stalled");
    let next = h.add_after("next", &[stalled]);

    let (report, affected) = with_timeout(async {
        tokio::join!(h.manager.execute_all(), async {
            wait_for_status(&h.manager, stalled, TaskStatus::Running).await;
            h.manager.cancel_task(stalled)
        })
    })
    .await;

    let report = report?;
    assert_eq!(affected?, vec![stalled, next]);
    assert_eq!(report.status_of(stalled), Some(TaskStatus::Cancelled));
    assert_eq!(report.status_of(next), Some(TaskStatus::Cancelled));
    assert_eq!(cancel_reason(&h, stalled), Some(CancelReason::Requested));
    assert_eq!(h.backend.aborted(), vec![stalled]);
    Ok(())
}

#[tokio::test]
async fn unacknowledged_abort_is_forced_after_timeout() -> TestResult {
    let h = Harness::with_options(
        ScriptedBackend::new().script("stuck", Script::IgnoreAbort),
        options(4, 50),
    );
    let stuck = h.add("stuck");

    let (report, _) = with_timeout(async {
        tokio::join!(h.manager.execute_all(), async {
            wait_for_status(&h.manager, stuck, TaskStatus::Running).await;
            h.manager.cancel_task(stuck)
        })
    })
    .await;

    assert_eq!(report?.status_of(stuck), Some(TaskStatus::Cancelled));
    assert_eq!(cancel_reason(&h, stuck), Some(CancelReason::Forced));
    Ok(())
}

#[tokio::test]
async fn cancelling_a_terminal_task_is_a_no_op() -> TestResult {
    let h = Harness::new(ScriptedBackend::new());
    let a = h.add("a");
    with_timeout(h.manager.execute_all()).await?;
    let before = h.sink.events().len();

    assert!(h.manager.cancel_task(a)?.is_empty());
    assert_eq!(h.manager.get_task_status(a)?, TaskStatus::Succeeded);
    assert_eq!(h.sink.events().len(), before);
    Ok(())
}

#[tokio::test]
async fn dependents_added_after_cancellation_are_cancelled_on_run() -> TestResult {
    let h = Harness::new(ScriptedBackend::new());
    let a = h.add("a");
    h.manager.cancel_task(a)?;
    let late = h.add_after("late", &[a]);

    let report = with_timeout(h.manager.execute_all()).await?;

    assert_eq!(report.status_of(late), Some(TaskStatus::Cancelled));
    assert_eq!(
        cancel_reason(&h, late),
        Some(CancelReason::UpstreamUnsuccessful { dependency: a })
    );
    assert!(h.backend.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn dropping_an_execution_cancels_what_it_started() -> TestResult {
    let h = Harness::new(ScriptedBackend::new().script("slow", Script::Hang));
    let slow = h.add("slow");

    let abandoned = tokio::time::timeout(Duration::from_millis(50), h.manager.execute_all()).await;
    assert!(abandoned.is_err());

    assert_eq!(h.manager.get_task_status(slow)?, TaskStatus::Cancelled);
    assert_eq!(cancel_reason(&h, slow), Some(CancelReason::Forced));
    Ok(())
}
