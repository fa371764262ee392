// src/stats/analysis.rs

//! Derived views over statistics records. Pure functions; nothing here
//! touches storage.

use serde::Serialize;

use crate::errors::{BackupError, Result};
use crate::stats::BackupStatistics;
use crate::types::EmptySeriesPolicy;

/// Summary of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatisticsAnalysis {
    pub total_size: u64,
    pub file_count: u64,
    pub deduplication_ratio: f64,
    /// `total_size / file_count`, 0 when there are no files.
    pub average_file_size: f64,
    /// Bytes the deduplication avoided storing (`total_size * ratio`).
    pub saved_bytes: u64,
}

/// Direction of change across a series, comparing the last two records.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatisticsTrends {
    pub size_growth: i128,
    pub deduplication_trend: f64,
    /// Mean deduplication ratio nudged by half the trend, within `[0, 1]`.
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AggregatedStatistics {
    pub count: usize,
    pub total_size: u64,
    pub average_size: f64,
    pub max_size: u64,
    pub min_size: u64,
}

pub fn analyse(record: &BackupStatistics) -> StatisticsAnalysis {
    let total_size = record.total_size();
    let file_count = record.file_count();
    let ratio = record.deduplication_ratio();

    let average_file_size = if file_count == 0 {
        0.0
    } else {
        total_size as f64 / file_count as f64
    };

    StatisticsAnalysis {
        total_size,
        file_count,
        deduplication_ratio: ratio,
        average_file_size,
        saved_bytes: (total_size as f64 * ratio).round() as u64,
    }
}

pub fn trends(series: &[BackupStatistics]) -> StatisticsTrends {
    if series.is_empty() {
        return StatisticsTrends::default();
    }

    let (size_growth, deduplication_trend) = match series {
        [.., previous, last] => (
            i128::from(last.total_size()) - i128::from(previous.total_size()),
            last.deduplication_ratio() - previous.deduplication_ratio(),
        ),
        _ => (0, 0.0),
    };

    let mean_ratio =
        series.iter().map(|r| r.deduplication_ratio()).sum::<f64>() / series.len() as f64;

    StatisticsTrends {
        size_growth,
        deduplication_trend,
        efficiency_score: (mean_ratio + deduplication_trend / 2.0).clamp(0.0, 1.0),
    }
}

pub fn aggregate(
    series: &[BackupStatistics],
    policy: EmptySeriesPolicy,
) -> Result<AggregatedStatistics> {
    if series.is_empty() {
        return match policy {
            EmptySeriesPolicy::Zeros => Ok(AggregatedStatistics::default()),
            EmptySeriesPolicy::Error => Err(BackupError::EmptySeries),
        };
    }

    let sizes = series.iter().map(|r| r.total_size());
    let total_size: u64 = sizes.clone().fold(0u64, |acc, s| acc.saturating_add(s));

    Ok(AggregatedStatistics {
        count: series.len(),
        total_size,
        average_size: total_size as f64 / series.len() as f64,
        max_size: sizes.clone().max().unwrap_or(0),
        min_size: sizes.min().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn record(size: u64, files: u64, ratio: f64) -> BackupStatistics {
        BackupStatistics::new("nas", size, files, ratio, DateTime::<Utc>::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn default_record_analyses_to_zero() {
        assert_eq!(analyse(&BackupStatistics::default()), StatisticsAnalysis::default());
    }

    #[test]
    fn analysis_derives_average_and_savings() {
        let a = analyse(&record(1000, 4, 0.25));
        assert_eq!(a.average_file_size, 250.0);
        assert_eq!(a.saved_bytes, 250);
    }

    #[test]
    fn trends_compare_last_two_records() {
        let t = trends(&[record(100, 1, 0.2), record(80, 1, 0.4), record(200, 1, 0.6)]);
        assert_eq!(t.size_growth, 120);
        assert!((t.deduplication_trend - 0.2).abs() < 1e-9);
        assert!((t.efficiency_score - 0.5).abs() < 1e-9);

        let single = trends(&[record(100, 1, 0.3)]);
        assert_eq!(single.size_growth, 0);
        assert!((single.efficiency_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn efficiency_is_clamped() {
        let t = trends(&[record(1, 1, 0.0), record(1, 1, 1.0)]);
        assert_eq!(t.efficiency_score, 1.0);
    }

    #[test]
    fn aggregate_of_three_records() {
        let agg = aggregate(
            &[record(10, 1, 0.0), record(20, 1, 0.0), record(30, 1, 0.0)],
            EmptySeriesPolicy::Zeros,
        )
        .unwrap();
        assert_eq!(agg.count, 3);
        assert_eq!(agg.total_size, 60);
        assert_eq!(agg.average_size, 20.0);
        assert_eq!(agg.max_size, 30);
        assert_eq!(agg.min_size, 10);
    }

    #[test]
    fn empty_series_follows_policy() {
        assert_eq!(
            aggregate(&[], EmptySeriesPolicy::Zeros).unwrap(),
            AggregatedStatistics::default()
        );
        assert!(matches!(
            aggregate(&[], EmptySeriesPolicy::Error),
            Err(BackupError::EmptySeries)
        ));
    }
}
