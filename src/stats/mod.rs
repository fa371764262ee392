// src/stats/mod.rs

//! Backup statistics: the per-run record, the aggregator that stores and
//! summarises records, and export to csv/json/toml.

pub mod aggregator;
pub mod analysis;
pub mod export;
pub mod record;

pub use aggregator::StatisticsAggregator;
pub use analysis::{AggregatedStatistics, StatisticsAnalysis, StatisticsTrends};
pub use record::BackupStatistics;
