//! Job entity and its editable content.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::workflow::{Failure, JobStatus, Stage, WorkflowState};
use crate::{Error, Result};

/// One ingestion pipeline run for a single submitted URL.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Job {
    pub id: i64,
    pub url: String,
    pub user_email: String,
    pub status: JobStatus,
    pub detailed_workflow_state: WorkflowState,
    pub html_fetch_success: bool,
    pub video_fetch_success: bool,
    pub metadata_edited_at: Option<DateTime<Utc>>,
    pub failure: Option<Failure>,
    pub video_location: Option<String>,
    pub content_deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Stage the job failed at, if it failed.
    ///
    /// Falls back to the progress flags when no stage was recorded.
    pub fn failed_stage(&self) -> Option<Stage> {
        if self.detailed_workflow_state != WorkflowState::Failed
            && self.failure.is_none()
        {
            return None;
        }
        Some(match &self.failure {
            Some(failure) => failure.at_stage,
            None => Stage::from_progress_flags(
                self.html_fetch_success,
                self.metadata_edited_at.is_some(),
                self.video_fetch_success,
            ),
        })
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            url: self.url.clone(),
            user_email: self.user_email.clone(),
            status: self.status,
            detailed_workflow_state: self.detailed_workflow_state,
            failed_stage: self.failed_stage(),
            error_message: self.failure.as_ref().map(|f| f.reason.clone()),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// List view of a job, without metadata or transcript.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobSummary {
    pub id: i64,
    pub url: String,
    pub user_email: String,
    pub status: JobStatus,
    pub detailed_workflow_state: WorkflowState,
    pub failed_stage: Option<Stage>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Editable descriptive metadata of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Metadata {
    pub title: String,
    pub date: String,
    pub youtube_id: String,
    pub source: String,
}

impl Metadata {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title cannot be empty"));
        }
        if self.youtube_id.trim().is_empty() {
            return Err(Error::validation("youtube_id cannot be empty"));
        }
        if !self
            .youtube_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::validation(format!(
                "youtube_id contains invalid characters: {}",
                self.youtube_id
            )));
        }
        Ok(())
    }
}

/// One transcript-aligned span of the video, keyed by a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Segment {
    pub segment_hash: String,
    pub text: String,
    pub speaker: String,
    pub company: String,
    /// Seconds from the start of the video.
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Storage key of the rendered clip, once generated.
    #[serde(default, skip_deserializing)]
    pub clip_key: Option<String>,
}

/// Check an ordered transcript before it replaces the stored one.
pub fn validate_transcript(segments: &[Segment]) -> Result<()> {
    let mut seen = HashSet::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        if segment.segment_hash.trim().is_empty() {
            return Err(Error::validation(format!(
                "segment {index} has an empty segment_hash"
            )));
        }
        if !seen.insert(segment.segment_hash.as_str()) {
            return Err(Error::validation(format!(
                "duplicate segment_hash: {}",
                segment.segment_hash
            )));
        }
        if !segment.start_time.is_finite()
            || !segment.end_time.is_finite()
            || segment.start_time < 0.0
        {
            return Err(Error::validation(format!(
                "segment {} has invalid times",
                segment.segment_hash
            )));
        }
        if segment.end_time < segment.start_time {
            return Err(Error::validation(format!(
                "segment {} ends before it starts",
                segment.segment_hash
            )));
        }
    }
    Ok(())
}

/// Job together with its editable content.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobDetails {
    #[serde(flatten)]
    pub job: Job,
    pub metadata: Option<Metadata>,
    pub transcript: Vec<Segment>,
}
