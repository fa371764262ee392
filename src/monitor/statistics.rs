// src/monitor/statistics.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters over the change events a monitor has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatistics {
    pub total_events: u64,
    pub matched_events: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events_per_hour: f64,
}

impl MonitorStatistics {
    pub fn record(&mut self, at: DateTime<Utc>, matched: bool) {
        self.total_events += 1;
        if matched {
            self.matched_events += 1;
        }

        let first = self.first_event_time.map_or(at, |prev| prev.min(at));
        self.first_event_time = Some(first);
        let last = self.last_event_time.map_or(at, |prev| prev.max(at));
        self.last_event_time = Some(last);

        // Spans shorter than an hour count as one hour.
        let span_hours = ((last - first).num_milliseconds() as f64 / 3_600_000.0).max(1.0);
        self.events_per_hour = self.total_events as f64 / span_hours;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn rate_uses_at_least_one_hour() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut stats = MonitorStatistics::default();
        stats.record(t0, true);
        stats.record(t0 + Duration::minutes(5), false);

        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.matched_events, 1);
        assert_eq!(stats.events_per_hour, 2.0);
    }

    #[test]
    fn rate_over_a_long_span() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut stats = MonitorStatistics::default();
        for i in 0..4 {
            stats.record(t0 + Duration::hours(i), true);
        }
        assert_eq!(stats.first_event_time, Some(t0));
        assert_eq!(stats.last_event_time, Some(t0 + Duration::hours(3)));
        assert!((stats.events_per_hour - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn late_arriving_older_event_widens_the_span() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut stats = MonitorStatistics::default();
        stats.record(t0 + Duration::hours(4), true);
        stats.record(t0 + Duration::hours(6), true);
        stats.record(t0, true);

        assert_eq!(stats.first_event_time, Some(t0));
        assert_eq!(stats.last_event_time, Some(t0 + Duration::hours(6)));
        assert!((stats.events_per_hour - 3.0 / 6.0).abs() < 1e-9);
    }
}
