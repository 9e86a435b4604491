//! Job database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{ms_to_datetime, opt_ms_to_datetime};
use crate::domain::{Failure, Job, JobStatus, Metadata, Segment, Stage, WorkflowState};
use crate::{Error, Result};

/// Row of the `ingest_job` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: i64,
    pub url: String,
    pub user_email: String,
    pub detailed_workflow_state: String,
    pub html_fetch_success: bool,
    pub video_fetch_success: bool,
    pub metadata_edited_at: Option<i64>,
    /// Stage recorded with the failure, if the job failed.
    pub failed_stage: Option<String>,
    pub error_message: Option<String>,
    pub video_location: Option<String>,
    pub content_deleted_at: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

impl JobDbModel {
    pub fn state(&self) -> Result<WorkflowState> {
        WorkflowState::parse(&self.detailed_workflow_state).ok_or_else(|| {
            Error::Database(format!(
                "job {} has unknown workflow state '{}'",
                self.id, self.detailed_workflow_state
            ))
        })
    }

    fn failure(&self) -> Option<Failure> {
        if self.failed_stage.is_none() && self.error_message.is_none() {
            return None;
        }
        let at_stage = self
            .failed_stage
            .as_deref()
            .and_then(|s| s.parse::<Stage>().ok())
            .unwrap_or_else(|| {
                Stage::from_progress_flags(
                    self.html_fetch_success,
                    self.metadata_edited_at.is_some(),
                    self.video_fetch_success,
                )
            });
        Some(Failure::new(
            at_stage,
            self.error_message.clone().unwrap_or_default(),
        ))
    }
}

impl TryFrom<JobDbModel> for Job {
    type Error = Error;

    fn try_from(row: JobDbModel) -> Result<Self> {
        let state = row.state()?;
        let failure = row.failure();
        Ok(Job {
            id: row.id,
            status: JobStatus::project(state),
            detailed_workflow_state: state,
            html_fetch_success: row.html_fetch_success,
            video_fetch_success: row.video_fetch_success,
            metadata_edited_at: opt_ms_to_datetime(row.metadata_edited_at),
            failure,
            video_location: row.video_location,
            content_deleted_at: opt_ms_to_datetime(row.content_deleted_at),
            created_at: ms_to_datetime(row.created_at),
            started_at: opt_ms_to_datetime(row.started_at),
            completed_at: opt_ms_to_datetime(row.completed_at),
            url: row.url,
            user_email: row.user_email,
        })
    }
}

/// Row of the `job_metadata` table.
#[derive(Debug, Clone, FromRow)]
pub struct MetadataDbModel {
    pub job_id: i64,
    pub title: String,
    pub date: String,
    pub youtube_id: String,
    pub source: String,
    pub updated_at: i64,
}

impl From<MetadataDbModel> for Metadata {
    fn from(row: MetadataDbModel) -> Self {
        Self {
            title: row.title,
            date: row.date,
            youtube_id: row.youtube_id,
            source: row.source,
        }
    }
}

/// Row of the `transcript_segment` table.
#[derive(Debug, Clone, FromRow)]
pub struct SegmentDbModel {
    pub job_id: i64,
    pub position: i64,
    pub segment_hash: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub speaker: String,
    pub company: String,
    /// JSON array of subject strings.
    pub subjects: String,
    pub clip_key: Option<String>,
}

impl TryFrom<SegmentDbModel> for Segment {
    type Error = Error;

    fn try_from(row: SegmentDbModel) -> Result<Self> {
        Ok(Segment {
            subjects: serde_json::from_str(&row.subjects)?,
            segment_hash: row.segment_hash,
            text: row.text,
            speaker: row.speaker,
            company: row.company,
            start_time: row.start_time,
            end_time: row.end_time,
            clip_key: row.clip_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: &str) -> JobDbModel {
        JobDbModel {
            id: 7,
            url: "https://x.test/a".to_string(),
            user_email: "a@b.com".to_string(),
            detailed_workflow_state: state.to_string(),
            html_fetch_success: true,
            video_fetch_success: false,
            metadata_edited_at: Some(1_700_000_000_000),
            failed_stage: None,
            error_message: None,
            video_location: None,
            content_deleted_at: None,
            created_at: 1_700_000_000_000,
            started_at: None,
            completed_at: None,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_status_is_projected_from_state() {
        let job = Job::try_from(row("generating_clips")).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.detailed_workflow_state, WorkflowState::GeneratingClips);
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        assert!(Job::try_from(row("exploded")).is_err());
    }

    #[test]
    fn test_failure_without_recorded_stage_uses_flags() {
        let mut failed = row("failed");
        failed.error_message = Some("timeout".to_string());
        let job = Job::try_from(failed).unwrap();
        assert_eq!(
            job.failure,
            Some(Failure::new(Stage::VideoFetch, "timeout"))
        );
    }

    #[test]
    fn test_segment_subjects_decode() {
        let segment = Segment::try_from(SegmentDbModel {
            job_id: 1,
            position: 0,
            segment_hash: "abc".to_string(),
            start_time: 1.0,
            end_time: 2.0,
            text: "t".to_string(),
            speaker: "s".to_string(),
            company: "c".to_string(),
            subjects: r#"["ai","chips"]"#.to_string(),
            clip_key: None,
        })
        .unwrap();
        assert_eq!(segment.subjects, vec!["ai", "chips"]);
    }
}
