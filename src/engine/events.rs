// src/engine/events.rs

//! Notifications published by the task manager.
//!
//! Publishing is fire-and-forget: a sink must not block and cannot fail the
//! operation that produced the event.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::stats::BackupStatistics;
use crate::task::TaskId;

/// Why a task ended `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CancelReason {
    /// `cancel_task` was called on this task, or the backend acknowledged
    /// an abort.
    Requested,
    /// An upstream task failed or was cancelled.
    UpstreamUnsuccessful { dependency: TaskId },
    /// The backend never acknowledged the abort within the cancel timeout.
    Forced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TaskEvent {
    TaskCreated { task: TaskId, name: String },
    TaskStarted { task: TaskId, name: String },
    TaskProgress { task: TaskId, progress: f64 },
    TaskSucceeded { task: TaskId, statistics: BackupStatistics },
    TaskFailed { task: TaskId, error: String },
    TaskCancelled { task: TaskId, reason: CancelReason },
    DependencyCycleRejected { task: TaskId, depends_on: TaskId },
    StatisticsError { task: Option<TaskId>, error: String },
    ValidationFailed { error: String },
}

impl TaskEvent {
    /// Wire name of the event, e.g. `task-created`.
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::TaskCreated { .. } => "task-created",
            TaskEvent::TaskStarted { .. } => "task-started",
            TaskEvent::TaskProgress { .. } => "task-progress",
            TaskEvent::TaskSucceeded { .. } => "task-succeeded",
            TaskEvent::TaskFailed { .. } => "task-failed",
            TaskEvent::TaskCancelled { .. } => "task-cancelled",
            TaskEvent::DependencyCycleRejected { .. } => "dependency-cycle-rejected",
            TaskEvent::StatisticsError { .. } => "statistics-error",
            TaskEvent::ValidationFailed { .. } => "validation-failed",
        }
    }

    /// Task the event is about, if any.
    pub fn task(&self) -> Option<TaskId> {
        match self {
            TaskEvent::TaskCreated { task, .. }
            | TaskEvent::TaskStarted { task, .. }
            | TaskEvent::TaskProgress { task, .. }
            | TaskEvent::TaskSucceeded { task, .. }
            | TaskEvent::TaskFailed { task, .. }
            | TaskEvent::TaskCancelled { task, .. }
            | TaskEvent::DependencyCycleRejected { task, .. } => Some(*task),
            TaskEvent::StatisticsError { task, .. } => *task,
            TaskEvent::ValidationFailed { .. } => None,
        }
    }

    /// JSON payload, including the `event` name.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Receives task events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: TaskEvent);
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: TaskEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: TaskEvent) {
        let name = event.name();
        let task = event.task().map(|t| t.to_string()).unwrap_or_default();
        match &event {
            TaskEvent::TaskFailed { error, .. } | TaskEvent::StatisticsError { error, .. } => {
                warn!(event = name, task = %task, error = %error, "task event");
            }
            TaskEvent::ValidationFailed { error } => {
                warn!(event = name, error = %error, "task event");
            }
            _ => info!(event = name, task = %task, payload = %event.payload(), "task event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_kebab_case_name() {
        let task = TaskId::new();
        let event = TaskEvent::TaskCancelled {
            task,
            reason: CancelReason::Requested,
        };
        let payload = event.payload();
        assert_eq!(payload["event"], "task-cancelled");
        assert_eq!(payload["event"], event.name());
        assert_eq!(payload["reason"]["kind"], "requested");
    }

    #[test]
    fn every_variant_name_matches_its_payload() {
        let task = TaskId::new();
        let events = vec![
            TaskEvent::TaskCreated { task, name: "a".into() },
            TaskEvent::TaskStarted { task, name: "a".into() },
            TaskEvent::TaskProgress { task, progress: 0.5 },
            TaskEvent::TaskSucceeded { task, statistics: BackupStatistics::default() },
            TaskEvent::TaskFailed { task, error: "boom".into() },
            TaskEvent::DependencyCycleRejected { task, depends_on: task },
            TaskEvent::StatisticsError { task: None, error: "disk".into() },
            TaskEvent::ValidationFailed { error: "bad".into() },
        ];
        for event in events {
            assert_eq!(event.payload()["event"], event.name());
        }
    }

    #[tokio::test]
    async fn channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.publish(TaskEvent::ValidationFailed { error: "x".into() });
        assert_eq!(rx.recv().await.unwrap().name(), "validation-failed");

        drop(rx);
        sink.publish(TaskEvent::ValidationFailed { error: "y".into() });
    }
}
