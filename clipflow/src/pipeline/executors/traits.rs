//! Stage executor contract.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::database::models::JobLogEntry;
use crate::domain::{Job, Metadata, Segment, Stage};

/// Everything an executor may read about the job it runs for.
///
/// Built fresh by the orchestrator for each attempt; executors never look
/// anything up on their own.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job: Job,
    pub metadata: Option<Metadata>,
    pub segments: Vec<Segment>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancelled when an operator forces the job to fail or on shutdown.
    pub cancellation_token: CancellationToken,
}

impl StageContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            metadata: None,
            segments: Vec::new(),
            attempt: 1,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn job_id(&self) -> i64 {
        self.job.id
    }
}

/// Artifacts produced by one successful stage run.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub metadata: Option<Metadata>,
    /// Replaces the stored transcript when present.
    pub segments: Option<Vec<Segment>>,
    pub video_location: Option<String>,
    /// Lines appended to the job log together with the result.
    pub logs: Vec<JobLogEntry>,
}

impl StageOutput {
    pub fn log(mut self, entry: JobLogEntry) -> Self {
        self.logs.push(entry);
        self
    }
}

/// One pipeline stage.
///
/// # Idempotence
///
/// An attempt may be abandoned (timeout, cancellation, crash) and run again.
/// Executors must produce the same artifacts on a rerun and must not write
/// to the job store; the orchestrator persists the output.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn stage(&self) -> Stage;

    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput>;
}

/// The executors the orchestrator drives, one per automatic stage.
#[derive(Clone)]
pub struct StageExecutors {
    pub html: Arc<dyn StageExecutor>,
    pub video: Arc<dyn StageExecutor>,
    pub clips: Arc<dyn StageExecutor>,
}

impl StageExecutors {
    pub fn new(
        html: Arc<dyn StageExecutor>,
        video: Arc<dyn StageExecutor>,
        clips: Arc<dyn StageExecutor>,
    ) -> Self {
        Self { html, video, clips }
    }

    pub fn for_stage(&self, stage: Stage) -> Option<&Arc<dyn StageExecutor>> {
        match stage {
            Stage::HtmlFetch => Some(&self.html),
            Stage::VideoFetch => Some(&self.video),
            Stage::ClipGeneration => Some(&self.clips),
            Stage::MetadataEdit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(Stage);

    #[async_trait]
    impl StageExecutor for Noop {
        fn stage(&self) -> Stage {
            self.0
        }

        fn name(&self) -> &'static str {
            "noop"
        }

        async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput> {
            Ok(StageOutput::default().log(JobLogEntry::info("noop")))
        }
    }

    #[test]
    fn test_for_stage_routes_by_stage() {
        let executors = StageExecutors::new(
            Arc::new(Noop(Stage::HtmlFetch)),
            Arc::new(Noop(Stage::VideoFetch)),
            Arc::new(Noop(Stage::ClipGeneration)),
        );
        for stage in [Stage::HtmlFetch, Stage::VideoFetch, Stage::ClipGeneration] {
            assert_eq!(executors.for_stage(stage).unwrap().stage(), stage);
        }
        assert!(executors.for_stage(Stage::MetadataEdit).is_none());
    }

    #[test]
    fn test_output_default_is_empty() {
        let output = StageOutput::default();
        assert!(output.metadata.is_none());
        assert!(output.segments.is_none());
        assert!(output.logs.is_empty());
    }
}
