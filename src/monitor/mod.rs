// src/monitor/mod.rs

//! Backup monitor.
//!
//! A monitor consumes change events from an external filesystem watcher and
//! decides whether a backup of its repository is due. It never watches the
//! filesystem itself.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{BackupError, Result};

pub mod filters;
pub mod statistics;

pub use filters::{FilterRule, FilterSet};
pub use statistics::MonitorStatistics;

/// Smallest accepted check interval, in seconds.
pub const MIN_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A change reported by the external watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp,
        }
    }
}

/// Outcome of [`BackupMonitor::handle_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDecision {
    /// The monitor is switched off.
    Inactive,
    /// The path is excluded by the filters.
    Filtered,
    /// Relevant change, but the check interval has not elapsed yet.
    Deferred,
    /// A backup should run now; the check time has been recorded.
    Due,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMonitor")]
pub struct BackupMonitor {
    id: String,
    repository_id: String,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_check_time: Option<DateTime<Utc>>,
    check_interval: u64,
    filters: Vec<FilterRule>,
    statistics: MonitorStatistics,
    #[serde(skip)]
    matcher: FilterSet,
}

#[derive(Debug, Deserialize)]
struct RawMonitor {
    id: String,
    repository_id: String,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default)]
    last_check_time: Option<DateTime<Utc>>,
    #[serde(default = "default_check_interval")]
    check_interval: u64,
    #[serde(default)]
    filters: Vec<FilterRule>,
    #[serde(default)]
    statistics: MonitorStatistics,
}

fn default_active() -> bool {
    true
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl TryFrom<RawMonitor> for BackupMonitor {
    type Error = BackupError;

    fn try_from(raw: RawMonitor) -> Result<Self> {
        if raw.check_interval < MIN_CHECK_INTERVAL_SECS {
            return Err(BackupError::Validation(format!(
                "check interval must be at least {MIN_CHECK_INTERVAL_SECS}s (got {})",
                raw.check_interval
            )));
        }

        Ok(Self {
            matcher: FilterSet::compile(&raw.filters)?,
            id: raw.id,
            repository_id: raw.repository_id,
            is_active: raw.is_active,
            last_check_time: raw.last_check_time,
            check_interval: raw.check_interval,
            filters: raw.filters,
            statistics: raw.statistics,
        })
    }
}

impl PartialEq for BackupMonitor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.repository_id == other.repository_id
            && self.is_active == other.is_active
            && self.last_check_time == other.last_check_time
            && self.check_interval == other.check_interval
            && self.filters == other.filters
            && self.statistics == other.statistics
    }
}

impl BackupMonitor {
    pub fn new(id: impl Into<String>, repository_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repository_id: repository_id.into(),
            is_active: true,
            last_check_time: None,
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            filters: Vec::new(),
            statistics: MonitorStatistics::default(),
            matcher: FilterSet::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.last_check_time
    }

    pub fn check_interval(&self) -> u64 {
        self.check_interval
    }

    pub fn filters(&self) -> &[FilterRule] {
        &self.filters
    }

    pub fn statistics(&self) -> &MonitorStatistics {
        &self.statistics
    }

    /// Change the interval. Values below the minimum are ignored and the
    /// previous interval is kept; returns whether the value was applied.
    pub fn set_check_interval(&mut self, secs: u64) -> bool {
        if secs < MIN_CHECK_INTERVAL_SECS {
            debug!(monitor = %self.id, requested = secs, kept = self.check_interval, "ignoring check interval below minimum");
            return false;
        }
        self.check_interval = secs;
        true
    }

    pub fn set_filters(&mut self, filters: Vec<FilterRule>) -> Result<()> {
        self.matcher = FilterSet::compile(&filters)?;
        self.filters = filters;
        Ok(())
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.matcher.matches(path)
    }

    pub fn should_check(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_check_time {
            None => true,
            // A check time in the future never counts as elapsed.
            Some(last) => u64::try_from((now - last).num_seconds())
                .is_ok_and(|elapsed| elapsed >= self.check_interval),
        }
    }

    pub fn record_check(&mut self, now: DateTime<Utc>) {
        self.last_check_time = Some(now);
    }

    /// Account for one change event and decide whether a backup is due.
    pub fn handle_event(&mut self, event: &ChangeEvent, now: DateTime<Utc>) -> MonitorDecision {
        let matched = self.matches(&event.path);
        self.statistics.record(event.timestamp, matched);

        let decision = if !self.is_active {
            MonitorDecision::Inactive
        } else if !matched {
            MonitorDecision::Filtered
        } else if !self.should_check(now) {
            MonitorDecision::Deferred
        } else {
            self.record_check(now);
            MonitorDecision::Due
        };

        debug!(monitor = %self.id, path = %event.path.display(), ?decision, "handled change event");
        decision
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn short_intervals_are_ignored() {
        let mut monitor = BackupMonitor::new("m", "nas");
        assert!(!monitor.set_check_interval(30));
        assert_eq!(monitor.check_interval(), 300);
        assert!(monitor.set_check_interval(60));
        assert_eq!(monitor.check_interval(), 60);
    }

    #[test]
    fn should_check_honours_interval_and_activity() {
        let mut monitor = BackupMonitor::new("m", "nas");
        assert!(monitor.should_check(t(0)));

        monitor.record_check(t(0));
        assert!(!monitor.should_check(t(299)));
        assert!(monitor.should_check(t(300)));

        monitor.set_active(false);
        assert!(!monitor.should_check(t(1000)));
    }

    #[test]
    fn huge_intervals_are_never_due_after_a_check() {
        let mut monitor = BackupMonitor::new("m", "nas");
        assert!(monitor.set_check_interval(u64::MAX));
        monitor.record_check(t(0));

        assert!(!monitor.should_check(t(0)));
        assert!(!monitor.should_check(t(10_000_000_000)));

        let doc = ChangeEvent::new("/d/a.txt", ChangeKind::Modified, t(5));
        assert_eq!(monitor.handle_event(&doc, t(5)), MonitorDecision::Deferred);
    }

    #[test]
    fn check_time_ahead_of_now_is_not_due() {
        let mut monitor = BackupMonitor::new("m", "nas");
        monitor.record_check(t(1000));
        assert!(!monitor.should_check(t(0)));
    }

    #[test]
    fn handle_event_decisions() {
        let mut monitor = BackupMonitor::new("m", "nas");
        monitor
            .set_filters(vec![FilterRule::Exclude("**/*.tmp".into())])
            .unwrap();

        let tmp = ChangeEvent::new("/d/a.tmp", ChangeKind::Created, t(0));
        let doc = ChangeEvent::new("/d/a.txt", ChangeKind::Modified, t(0));

        assert_eq!(monitor.handle_event(&tmp, t(0)), MonitorDecision::Filtered);
        assert_eq!(monitor.handle_event(&doc, t(0)), MonitorDecision::Due);
        assert_eq!(monitor.last_check_time(), Some(t(0)));
        assert_eq!(monitor.handle_event(&doc, t(10)), MonitorDecision::Deferred);

        monitor.set_active(false);
        assert_eq!(monitor.handle_event(&doc, t(999)), MonitorDecision::Inactive);

        assert_eq!(monitor.statistics().total_events, 4);
        assert_eq!(monitor.statistics().matched_events, 3);
    }

    #[test]
    fn decoding_rejects_short_interval() {
        let json = r#"{"id":"m","repository_id":"nas","check_interval":30}"#;
        assert!(serde_json::from_str::<BackupMonitor>(json).is_err());

        let json = r#"{"id":"m","repository_id":"nas"}"#;
        let monitor: BackupMonitor = serde_json::from_str(json).unwrap();
        assert_eq!(monitor.check_interval(), 300);
        assert!(monitor.is_active());
    }

    #[test]
    fn decoded_filters_are_compiled() {
        let mut monitor = BackupMonitor::new("m", "nas");
        monitor
            .set_filters(vec![FilterRule::Include("/home/**".into())])
            .unwrap();

        let json = serde_json::to_string(&monitor).unwrap();
        let back: BackupMonitor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, monitor);
        assert!(back.matches(Path::new("/home/me/x")));
        assert!(!back.matches(Path::new("/etc/x")));
    }
}
