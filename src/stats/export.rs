// src/stats/export.rs

use chrono::SecondsFormat;
use serde::Serialize;

use crate::errors::{BackupError, Result};
use crate::stats::BackupStatistics;
use crate::types::ExportFormat;

const CSV_HEADER: [&str; 7] = [
    "repository_id",
    "total_size",
    "file_count",
    "deduplication_ratio",
    "timestamp",
    "snapshot_id",
    "duration_secs",
];

/// TOML has no top-level arrays.
#[derive(Serialize)]
struct TomlDocument<'a> {
    statistics: &'a [BackupStatistics],
}

pub fn export(series: &[BackupStatistics], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => to_csv(series),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(series)?),
        ExportFormat::Toml => toml::to_string(&TomlDocument { statistics: series })
            .map_err(|e| BackupError::Other(e.into())),
    }
}

fn to_csv(series: &[BackupStatistics]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER).map_err(csv_error)?;
    for record in series {
        writer
            .write_record([
                record.repository_id().to_string(),
                record.total_size().to_string(),
                record.file_count().to_string(),
                record.deduplication_ratio().to_string(),
                record.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, true),
                record.snapshot_id().unwrap_or_default().to_string(),
                record.duration_secs().map(|d| d.to_string()).unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer.into_inner().map_err(|e| BackupError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| BackupError::Other(e.into()))
}

fn csv_error(err: csv::Error) -> BackupError {
    BackupError::Other(err.into())
}
