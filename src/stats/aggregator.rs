// src/stats/aggregator.rs

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{BackupError, Result};
use crate::stats::analysis::{self, AggregatedStatistics, StatisticsAnalysis, StatisticsTrends};
use crate::stats::{BackupStatistics, export};
use crate::store::{RecordStore, codec};
use crate::types::{EmptySeriesPolicy, ExportFormat};

const KEY_PREFIX: &str = "statistics";

/// Stores, retrieves and summarises backup statistics.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn RecordStore>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn analyse_statistics(&self, record: &BackupStatistics) -> StatisticsAnalysis {
        analysis::analyse(record)
    }

    pub fn calculate_trends(&self, series: &[BackupStatistics]) -> StatisticsTrends {
        analysis::trends(series)
    }

    /// Aggregate a series; an empty series yields all zeros.
    pub fn aggregate_statistics(&self, series: &[BackupStatistics]) -> AggregatedStatistics {
        analysis::aggregate(series, EmptySeriesPolicy::Zeros).unwrap_or_default()
    }

    pub fn aggregate_statistics_with(
        &self,
        series: &[BackupStatistics],
        policy: EmptySeriesPolicy,
    ) -> Result<AggregatedStatistics> {
        analysis::aggregate(series, policy)
    }

    /// Persist a record under a freshly generated key and return that key.
    pub fn store_statistics(&self, record: &BackupStatistics) -> Result<String> {
        let key = format!(
            "{}{}",
            repository_prefix(record.repository_id()),
            Uuid::new_v4()
        );
        let bytes = codec::encode(record)?;
        self.store.write(&key, &bytes)?;
        info!(key = %key, repository = %record.repository_id(), "stored backup statistics");
        Ok(key)
    }

    /// Load the record stored under `key`.
    ///
    /// Unknown keys and records that no longer decode are both `NotFound`.
    pub fn retrieve_statistics(&self, key: &str) -> Result<BackupStatistics> {
        let Some(bytes) = self.store.read(key)? else {
            return Err(BackupError::NotFound(key.to_string()));
        };

        codec::decode(&bytes).map_err(|err| {
            warn!(key = %key, error = %err, "stored statistics failed to decode");
            BackupError::NotFound(format!("{key} (corrupted record)"))
        })
    }

    /// Every readable record of one repository, oldest first. Damaged
    /// records are skipped.
    pub fn history(&self, repository_id: &str) -> Result<Vec<BackupStatistics>> {
        let mut series = Vec::new();
        for key in self.store.keys(&repository_prefix(repository_id))? {
            match self.retrieve_statistics(&key) {
                Ok(record) => series.push(record),
                Err(BackupError::NotFound(_)) => debug!(key = %key, "skipping unreadable record"),
                Err(err) => return Err(err),
            }
        }
        series.sort_by_key(|r| r.timestamp());
        Ok(series)
    }

    /// Render a series as `csv`, `json` or `toml`.
    pub fn export_statistics(&self, series: &[BackupStatistics], format: &str) -> Result<String> {
        let format: ExportFormat = format.parse()?;
        export::export(series, format)
    }
}

/// `statistics/<repository>/`, with characters that are not safe in a key
/// segment replaced by `_`.
fn repository_prefix(repository_id: &str) -> String {
    let segment: String = repository_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let segment = if segment.is_empty() { "_".to_string() } else { segment };
    format!("{KEY_PREFIX}/{segment}/")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::store::MemoryStore;

    fn aggregator() -> (StatisticsAggregator, MemoryStore) {
        let store = MemoryStore::new();
        (StatisticsAggregator::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn repository_ids_are_sanitised_into_one_segment() {
        assert_eq!(repository_prefix("nas"), "statistics/nas/");
        assert_eq!(repository_prefix("s3://bucket/x"), "statistics/s3___bucket_x/");
        assert_eq!(repository_prefix(""), "statistics/_/");
    }

    #[test]
    fn stored_records_come_back_unchanged() {
        let (agg, _) = aggregator();
        let record = BackupStatistics::new("nas", 42, 2, 0.5, Utc::now()).unwrap();

        let key = agg.store_statistics(&record).unwrap();
        assert!(key.starts_with("statistics/nas/"));
        assert_eq!(agg.retrieve_statistics(&key).unwrap(), record);
    }

    #[test]
    fn unknown_and_undecodable_keys_are_not_found() {
        let (agg, store) = aggregator();
        assert!(matches!(
            agg.retrieve_statistics("statistics/nas/missing"),
            Err(BackupError::NotFound(_))
        ));

        store.insert_raw("statistics/nas/broken", b"{\"total_size\":".to_vec());
        assert!(matches!(
            agg.retrieve_statistics("statistics/nas/broken"),
            Err(BackupError::NotFound(_))
        ));
    }

    #[test]
    fn history_is_sorted_and_skips_damaged_records() {
        let (agg, store) = aggregator();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = BackupStatistics::new("nas", 2, 1, 0.0, t0 + Duration::hours(1)).unwrap();
        let earlier = BackupStatistics::new("nas", 1, 1, 0.0, t0).unwrap();
        let other = BackupStatistics::new("cloud", 3, 1, 0.0, t0).unwrap();

        for r in [&later, &earlier, &other] {
            agg.store_statistics(r).unwrap();
        }
        store.insert_raw("statistics/nas/zzz", b"junk".to_vec());

        assert_eq!(agg.history("nas").unwrap(), vec![earlier, later]);
    }

    #[test]
    fn unknown_export_format_is_rejected() {
        let (agg, _) = aggregator();
        assert!(matches!(
            agg.export_statistics(&[], "xml"),
            Err(BackupError::UnsupportedFormat(_))
        ));
        assert!(agg.export_statistics(&[], "csv").is_ok());
    }
}
