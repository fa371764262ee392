use std::sync::Mutex;

use backupdag::engine::{EventSink, TaskEvent};
use backupdag::task::TaskId;

/// Event sink that keeps every published event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event names in publish order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(TaskEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    /// Names of the events about `task`, in publish order.
    pub fn names_for(&self, task: TaskId) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.task() == Some(task))
            .map(TaskEvent::name)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }
}
