//! Clip generation stage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::traits::{StageContext, StageExecutor, StageOutput};
use crate::database::models::JobLogEntry;
use crate::domain::Stage;
use crate::media::{ClipRequest, MediaBackend};
use crate::{Error, Result};

/// Renders one clip per transcript segment and finalizes the transcript.
pub struct ClipGenerator {
    media: Arc<dyn MediaBackend>,
}

impl ClipGenerator {
    pub fn new(media: Arc<dyn MediaBackend>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl StageExecutor for ClipGenerator {
    fn stage(&self) -> Stage {
        Stage::ClipGeneration
    }

    fn name(&self) -> &'static str {
        "clip_generator"
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput> {
        let metadata = ctx
            .metadata
            .as_ref()
            .ok_or_else(|| Error::stage_failed(Stage::ClipGeneration, "job has no metadata"))?;
        let video = ctx.job.video_location.as_deref().ok_or_else(|| {
            Error::stage_failed(Stage::ClipGeneration, "job has no fetched video")
        })?;

        let mut segments = ctx.segments.clone();
        for segment in &mut segments {
            if ctx.cancellation_token.is_cancelled() {
                return Err(Error::stage_failed(Stage::ClipGeneration, "cancelled"));
            }
            let key = self
                .media
                .render_clip(
                    video,
                    &ClipRequest {
                        youtube_id: &metadata.youtube_id,
                        segment_hash: &segment.segment_hash,
                        start_time: segment.start_time,
                        end_time: segment.end_time,
                    },
                )
                .await?;
            debug!(job_id = ctx.job_id(), clip = %key, "Rendered clip");
            segment.clip_key = Some(key);
        }

        let mut output = StageOutput::default().log(JobLogEntry::info(format!(
            "Generated {} clips for {}",
            segments.len(),
            metadata.youtube_id
        )));
        if segments.is_empty() {
            output = output.log(JobLogEntry::warn("Transcript is empty; no clips generated"));
        }
        output.segments = Some(segments);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobStatus, Metadata, Segment, WorkflowState};
    use crate::media::{LocalMediaBackend, MediaConfig};
    use tempfile::TempDir;

    fn context(video_location: Option<&str>, segments: Vec<Segment>) -> StageContext {
        let job = Job {
            id: 4,
            url: "https://x.test/a".to_string(),
            user_email: "a@b.com".to_string(),
            status: JobStatus::Running,
            detailed_workflow_state: WorkflowState::GeneratingClips,
            html_fetch_success: true,
            video_fetch_success: true,
            metadata_edited_at: Some(chrono::Utc::now()),
            failure: None,
            video_location: video_location.map(str::to_string),
            content_deleted_at: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };
        StageContext::new(job)
            .with_metadata(Some(Metadata {
                title: "t".to_string(),
                date: "d".to_string(),
                youtube_id: "vid".to_string(),
                source: "s".to_string(),
            }))
            .with_segments(segments)
    }

    fn segment(hash: &str) -> Segment {
        Segment {
            segment_hash: hash.to_string(),
            text: "x".to_string(),
            speaker: "s".to_string(),
            company: "c".to_string(),
            start_time: 0.0,
            end_time: 1.0,
            subjects: vec![],
            clip_key: None,
        }
    }

    fn generator(dir: &TempDir) -> ClipGenerator {
        ClipGenerator::new(Arc::new(LocalMediaBackend::new(MediaConfig {
            video_dir: dir.path().join("videos"),
            clip_dir: dir.path().join("clips"),
        })))
    }

    #[tokio::test]
    async fn test_clips_are_keyed_by_segment_hash() {
        let dir = TempDir::new().unwrap();
        let ctx = context(Some("/videos/vid.mp4"), vec![segment("h1"), segment("h2")]);
        let output = generator(&dir).execute(&ctx).await.unwrap();

        let segments = output.segments.unwrap();
        assert_eq!(segments[0].clip_key.as_deref(), Some("vid_h1.mp4"));
        assert_eq!(segments[1].clip_key.as_deref(), Some("vid_h2.mp4"));
    }

    #[tokio::test]
    async fn test_missing_video_is_a_permanent_failure() {
        let dir = TempDir::new().unwrap();
        let err = generator(&dir)
            .execute(&context(None, vec![segment("h1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StageFailed { stage: Stage::ClipGeneration, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_rendering() {
        let dir = TempDir::new().unwrap();
        let ctx = context(Some("/videos/vid.mp4"), vec![segment("h1")]);
        ctx.cancellation_token.cancel();
        assert!(generator(&dir).execute(&ctx).await.is_err());
    }
}
