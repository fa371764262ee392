// src/stats/record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{BackupError, Result};

/// Statistics produced by one completed backup.
///
/// Records are immutable; the deduplication ratio is checked on construction
/// and when decoding, so a stored record always satisfies `0 <= ratio <= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBackupStatistics")]
pub struct BackupStatistics {
    repository_id: String,
    total_size: u64,
    file_count: u64,
    deduplication_ratio: f64,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

/// Unchecked wire shape of [`BackupStatistics`].
#[derive(Debug, Deserialize)]
struct RawBackupStatistics {
    repository_id: String,
    total_size: u64,
    file_count: u64,
    deduplication_ratio: f64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    duration_secs: Option<f64>,
}

impl TryFrom<RawBackupStatistics> for BackupStatistics {
    type Error = BackupError;

    fn try_from(raw: RawBackupStatistics) -> Result<Self> {
        let mut record = BackupStatistics::new(
            raw.repository_id,
            raw.total_size,
            raw.file_count,
            raw.deduplication_ratio,
            raw.timestamp,
        )?;
        record.snapshot_id = raw.snapshot_id;
        if let Some(secs) = raw.duration_secs {
            record = record.with_duration_secs(secs)?;
        }
        Ok(record)
    }
}

impl Default for BackupStatistics {
    fn default() -> Self {
        Self {
            repository_id: String::new(),
            total_size: 0,
            file_count: 0,
            deduplication_ratio: 0.0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            snapshot_id: None,
            duration_secs: None,
        }
    }
}

impl BackupStatistics {
    pub fn new(
        repository_id: impl Into<String>,
        total_size: u64,
        file_count: u64,
        deduplication_ratio: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&deduplication_ratio) {
            return Err(BackupError::Validation(format!(
                "deduplication ratio must be within [0, 1] (got {deduplication_ratio})"
            )));
        }
        Ok(Self {
            repository_id: repository_id.into(),
            total_size,
            file_count,
            deduplication_ratio,
            timestamp,
            snapshot_id: None,
            duration_secs: None,
        })
    }

    pub fn with_snapshot_id(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }

    pub fn with_duration_secs(mut self, secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(BackupError::Validation(format!(
                "duration must be a non-negative number of seconds (got {secs})"
            )));
        }
        self.duration_secs = Some(secs);
        Ok(self)
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    pub fn deduplication_ratio(&self) -> f64 {
        self.deduplication_ratio
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }
}
