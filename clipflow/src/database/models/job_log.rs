//! Job log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};

/// Log level for job execution logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A single timestamped line of a job's execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn timestamp_ms(&self) -> i64 {
        datetime_to_ms(self.timestamp)
    }
}

/// Row of the `job_log` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobLogDbModel {
    pub id: i64,
    pub job_id: i64,
    pub level: String,
    pub message: String,
    pub created_at: i64,
}

impl From<JobLogDbModel> for JobLogEntry {
    fn from(row: JobLogDbModel) -> Self {
        Self {
            timestamp: ms_to_datetime(row.created_at),
            level: row.level.parse().unwrap_or_default(),
            message: row.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_strings() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
    }

    #[test]
    fn test_unknown_level_reads_as_info() {
        let entry = JobLogEntry::from(JobLogDbModel {
            id: 1,
            job_id: 1,
            level: "loud".to_string(),
            message: "m".to_string(),
            created_at: 0,
        });
        assert_eq!(entry.level, LogLevel::Info);
    }
}
