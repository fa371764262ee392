use std::str::FromStr;

use serde::Deserialize;

use crate::errors::BackupError;

/// Output format for `StatisticsAggregator::export_statistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated values with a header row.
    Csv,
    /// A JSON array of records.
    Json,
    /// A TOML document with one `[[statistics]]` table per record.
    Toml,
}

impl FromStr for ExportFormat {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "toml" => Ok(ExportFormat::Toml),
            other => Err(BackupError::UnsupportedFormat(format!(
                "{other} (expected \"csv\", \"json\" or \"toml\")"
            ))),
        }
    }
}

/// What aggregation does with an empty series.
///
/// - `Zeros` (default): every aggregate is zero.
/// - `Error`: fail with `BackupError::EmptySeries`, for callers that need a
///   defined minimum and maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySeriesPolicy {
    #[default]
    Zeros,
    Error,
}

/// Log verbosity accepted by `logging::init_logging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_format_parsing_is_case_insensitive() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(BackupError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn log_level_accepts_warning_alias() {
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
