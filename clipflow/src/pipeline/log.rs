//! Per-job execution log.
//!
//! Lines are appended by the orchestrator and written alongside stage results;
//! readers get the whole log as one text blob.

use std::sync::Arc;

use chrono::SecondsFormat;

use crate::Result;
use crate::database::models::JobLogEntry;
use crate::database::repositories::JobRepository;

pub use crate::database::models::LogLevel;

/// Append-only log access for jobs.
#[derive(Clone)]
pub struct JobLog {
    repo: Arc<dyn JobRepository>,
}

impl JobLog {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self { repo }
    }

    pub async fn append(&self, job_id: i64, entry: JobLogEntry) -> Result<()> {
        self.repo.append_log(job_id, &entry).await
    }

    pub async fn entries(&self, job_id: i64) -> Result<Vec<JobLogEntry>> {
        // Not found surfaces here rather than as an empty log.
        self.repo.get_job(job_id).await?;
        let rows = self.repo.get_logs(job_id).await?;
        Ok(rows.into_iter().map(JobLogEntry::from).collect())
    }

    /// The job's log as a single blob, one line per entry.
    pub async fn render(&self, job_id: i64) -> Result<String> {
        Ok(render_entries(&self.entries(job_id).await?))
    }
}

pub fn render_line(entry: &JobLogEntry) -> String {
    format!(
        "{} [{}] {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        entry.level.to_string().to_uppercase(),
        entry.message
    )
}

pub fn render_entries(entries: &[JobLogEntry]) -> String {
    entries
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n")
}
