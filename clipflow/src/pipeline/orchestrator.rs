//! Workflow orchestrator.
//!
//! Drives each job through its stages, stops at the metadata checkpoint, and
//! applies human edits and operator actions. Every state change goes through
//! the job repository as a guarded transition, and at most one writer holds a
//! job at a time (see [`JobLocks`]).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::DispatchQueue;
use super::executors::{StageContext, StageExecutor, StageExecutors, StageOutput};
use super::job_locks::JobLocks;
use super::log::JobLog;
use crate::database::models::JobLogEntry;
use crate::database::repositories::{ContentEdit, JobFilter, JobRepository, StateTransition};
use crate::domain::{
    Failure, Job, JobDetails, JobSummary, Metadata, RetryPolicy, Segment, Stage, WorkflowState,
    validate_transcript,
};
use crate::notification::{LogNotifier, Notifier};
use crate::{Error, Result};

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Attempt budget applied to every stage executor.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Re-dispatch jobs left in automatic states by a previous run.
    #[serde(default = "default_true")]
    pub resume_interrupted: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            resume_interrupted: true,
        }
    }
}

impl OrchestratorConfig {
    /// Read `STAGE_MAX_RETRIES` and `STAGE_ATTEMPT_TIMEOUT_SECS`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Some(retries) = std::env::var("STAGE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.retry = config.retry.with_max_attempts(retries.saturating_add(1));
        }
        if let Some(secs) = std::env::var("STAGE_ATTEMPT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.retry = config
                .retry
                .with_attempt_timeout(std::time::Duration::from_secs(secs));
        }
        config
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// In-process notifications of workflow progress.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    JobSubmitted {
        job_id: i64,
    },
    StateChanged {
        job_id: i64,
        from: WorkflowState,
        to: WorkflowState,
    },
}

/// Result of running one stage with its retry budget.
enum StageOutcome {
    Succeeded(StageOutput),
    Failed(String),
    /// The job's token fired: forced failure or shutdown.
    Cancelled,
}

/// The workflow state machine service.
pub struct WorkflowOrchestrator {
    config: OrchestratorConfig,
    repo: Arc<dyn JobRepository>,
    executors: StageExecutors,
    notifier: Arc<dyn Notifier>,
    log: JobLog,
    locks: Arc<JobLocks>,
    queue: Arc<DispatchQueue>,
    cancellation_tokens: DashMap<i64, CancellationToken>,
    shutdown: CancellationToken,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, executors: StageExecutors) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config: OrchestratorConfig::default(),
            log: JobLog::new(repo.clone()),
            repo,
            executors,
            notifier: Arc::new(LogNotifier),
            locks: Arc::new(JobLocks::new()),
            queue: Arc::new(DispatchQueue::new()),
            cancellation_tokens: DashMap::new(),
            shutdown: CancellationToken::new(),
            event_tx,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share the per-job locks with other writers (the lifecycle manager).
    pub fn with_locks(mut self, locks: Arc<JobLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn locks(&self) -> Arc<JobLocks> {
        self.locks.clone()
    }

    pub fn queue(&self) -> Arc<DispatchQueue> {
        self.queue.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_job(&self, job_id: i64) -> Result<Job> {
        Job::try_from(self.repo.get_job(job_id).await?)
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobSummary>> {
        self.repo
            .list_jobs(filter)
            .await?
            .into_iter()
            .map(|row| Job::try_from(row).map(|job| job.summary()))
            .collect()
    }

    async fn load_content(&self, job_id: i64) -> Result<(Option<Metadata>, Vec<Segment>)> {
        let metadata = self.repo.get_metadata(job_id).await?.map(Metadata::from);
        let segments = self
            .repo
            .get_segments(job_id)
            .await?
            .into_iter()
            .map(Segment::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((metadata, segments))
    }

    pub async fn job_details(&self, job_id: i64) -> Result<JobDetails> {
        let job = self.get_job(job_id).await?;
        let (metadata, transcript) = self.load_content(job_id).await?;
        Ok(JobDetails {
            job,
            metadata,
            transcript,
        })
    }

    pub async fn job_log(&self, job_id: i64) -> Result<String> {
        self.log.render(job_id).await
    }

    // ------------------------------------------------------------------
    // Submission and dispatch
    // ------------------------------------------------------------------

    /// Create a job for `url` and queue it for processing.
    pub async fn submit(&self, url: &str, user_email: &str) -> Result<Job> {
        let url = validate_source_url(url)?;
        let user_email = validate_email(user_email)?;

        let row = self.repo.create_job(&url, &user_email).await?;
        let job = Job::try_from(row)?;
        self.log
            .append(job.id, JobLogEntry::info(format!("Job submitted for {url}")))
            .await?;

        info!(job_id = job.id, %url, "Job submitted");
        let _ = self.event_tx.send(WorkflowEvent::JobSubmitted { job_id: job.id });
        self.queue.push(job.id);
        Ok(job)
    }

    /// Queue every job a previous run left in an automatic state.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        if !self.config.resume_interrupted {
            return Ok(0);
        }
        let automatic = [
            WorkflowState::Pending,
            WorkflowState::FetchingHtml,
            WorkflowState::HtmlFetched,
            WorkflowState::FetchingVideo,
            WorkflowState::VideoFetched,
            WorkflowState::GeneratingClips,
        ];
        let jobs = self.repo.list_jobs_in_states(&automatic).await?;
        for job in &jobs {
            debug!(job_id = job.id, state = %job.detailed_workflow_state, "Resuming job");
            self.queue.push(job.id);
        }
        if !jobs.is_empty() {
            info!(count = jobs.len(), "Re-dispatched interrupted jobs");
        }
        Ok(jobs.len())
    }

    fn job_token(&self, job_id: i64) -> CancellationToken {
        self.cancellation_tokens
            .entry(job_id)
            .or_insert_with(|| self.shutdown.child_token())
            .clone()
    }

    /// Run a job's automatic steps until it reaches the checkpoint, a
    /// terminal state, or another writer changes it.
    pub async fn advance(&self, job_id: i64) -> Result<()> {
        let _guard = self.locks.acquire(job_id).await;
        let token = self.job_token(job_id);
        let result = self.drive(job_id, &token).await;
        self.cancellation_tokens.remove(&job_id);
        result
    }

    async fn drive(&self, job_id: i64, token: &CancellationToken) -> Result<()> {
        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            let job = self.get_job(job_id).await?;
            let state = job.detailed_workflow_state;

            let advanced = match state {
                WorkflowState::Pending => {
                    self.step(
                        StateTransition::new(job_id, state, WorkflowState::FetchingHtml)
                            .with_log(JobLogEntry::info("Fetching page")),
                    )
                    .await?
                }
                WorkflowState::HtmlFetched => {
                    let advanced = self
                        .step(
                            StateTransition::new(job_id, state, WorkflowState::EditingMetadata)
                                .with_log(JobLogEntry::info("Waiting for metadata review")),
                        )
                        .await?;
                    if advanced {
                        let job = self.get_job(job_id).await?;
                        if let Err(e) = self.notifier.job_ready_for_review(&job).await {
                            warn!(job_id, error = %e, "Failed to send review notification");
                        }
                    }
                    advanced
                }
                WorkflowState::VideoFetched => {
                    self.step(
                        StateTransition::new(job_id, state, WorkflowState::GeneratingClips)
                            .with_log(JobLogEntry::info("Generating clips")),
                    )
                    .await?
                }
                WorkflowState::FetchingHtml
                | WorkflowState::FetchingVideo
                | WorkflowState::GeneratingClips => self.run_stage(job, token).await?,
                WorkflowState::EditingMetadata
                | WorkflowState::Completed
                | WorkflowState::Failed
                | WorkflowState::Deleted => return Ok(()),
            };

            if !advanced {
                debug!(job_id, %state, "Job changed under the worker; stopping");
                return Ok(());
            }
        }
    }

    /// Apply a transition and announce it.
    async fn step(&self, transition: StateTransition) -> Result<bool> {
        let applied = self.repo.apply_transition(&transition).await?;
        if applied {
            debug!(
                job_id = transition.job_id,
                from = %transition.from,
                to = %transition.to,
                "Job transitioned"
            );
            let _ = self.event_tx.send(WorkflowEvent::StateChanged {
                job_id: transition.job_id,
                from: transition.from,
                to: transition.to,
            });
        }
        Ok(applied)
    }

    async fn run_stage(&self, job: Job, token: &CancellationToken) -> Result<bool> {
        let state = job.detailed_workflow_state;
        let (stage, next) = match (state.stage(), state.next()) {
            (Some(stage), Some(next)) => (stage, next),
            _ => return Err(Error::invalid_transition(state, "next stage")),
        };
        let executor = self
            .executors
            .for_stage(stage)
            .ok_or_else(|| Error::Other(format!("no executor for stage {stage}")))?
            .clone();

        let (metadata, segments) = self.load_content(job.id).await?;
        let had_metadata = metadata.is_some();
        let had_segments = !segments.is_empty();
        let ctx = StageContext::new(job)
            .with_metadata(metadata)
            .with_segments(segments)
            .with_cancellation_token(token.clone());
        let job_id = ctx.job_id();

        info!(job_id, stage = %stage, executor = executor.name(), "Running stage");
        let outcome = self.execute_with_retry(executor.as_ref(), ctx).await?;

        match outcome {
            StageOutcome::Succeeded(output) => {
                let mut transition = StateTransition::new(job_id, state, next).with_logs(output.logs);
                match stage {
                    Stage::HtmlFetch => {
                        transition = transition.with_html_fetched();
                        // Edits an operator made before the page arrived win.
                        if let Some(metadata) = output.metadata.filter(|_| !had_metadata) {
                            transition = transition.with_metadata(metadata);
                        }
                        if let Some(segments) = output.segments.filter(|_| !had_segments) {
                            if let Err(e) = validate_transcript(&segments) {
                                return self
                                    .fail_stage(
                                        job_id,
                                        state,
                                        stage,
                                        format!("page produced an unusable transcript: {e}"),
                                    )
                                    .await;
                            }
                            transition = transition.with_segments(segments);
                        }
                    }
                    Stage::VideoFetch => {
                        let Some(location) = output.video_location else {
                            return self
                                .fail_stage(job_id, state, stage, "video fetcher reported no location")
                                .await;
                        };
                        transition = transition.with_video_fetched(location);
                    }
                    Stage::ClipGeneration => {
                        if let Some(segments) = output.segments {
                            if let Err(e) = validate_transcript(&segments) {
                                return self
                                    .fail_stage(
                                        job_id,
                                        state,
                                        stage,
                                        format!("clip generator returned an unusable transcript: {e}"),
                                    )
                                    .await;
                            }
                            transition = transition.with_segments(segments);
                        }
                    }
                    Stage::MetadataEdit => {}
                }
                let transition =
                    transition.with_log(JobLogEntry::info(format!("Stage {stage} succeeded")));

                // A commit that cannot be written would leave the job in its
                // stage forever; fail it instead.
                let applied = match self.step(transition).await {
                    Ok(applied) => applied,
                    Err(e) => {
                        warn!(job_id, stage = %stage, error = %e, "Failed to record stage output");
                        return self
                            .fail_stage(
                                job_id,
                                state,
                                stage,
                                format!("could not record stage output: {e}"),
                            )
                            .await;
                    }
                };
                if applied && next == WorkflowState::Completed {
                    info!(job_id, "Job completed");
                    let job = self.get_job(job_id).await?;
                    if let Err(e) = self.notifier.job_completed(&job).await {
                        warn!(job_id, error = %e, "Failed to send completion notification");
                    }
                }
                Ok(applied)
            }
            StageOutcome::Failed(reason) => self.fail_stage(job_id, state, stage, reason).await,
            StageOutcome::Cancelled => {
                debug!(job_id, stage = %stage, "Stage cancelled");
                Ok(false)
            }
        }
    }

    async fn fail_stage(
        &self,
        job_id: i64,
        state: WorkflowState,
        stage: Stage,
        reason: impl Into<String>,
    ) -> Result<bool> {
        let failure = Failure::new(stage, reason);
        warn!(job_id, stage = %stage, reason = %failure.reason, "Stage failed");
        let transition = StateTransition::fail(job_id, state, failure.clone())
            .with_log(JobLogEntry::error(failure.to_string()));
        let applied = self.step(transition).await?;
        if applied {
            self.notify_failed(job_id, &failure).await;
        }
        Ok(applied)
    }

    async fn notify_failed(&self, job_id: i64, failure: &Failure) {
        match self.get_job(job_id).await {
            Ok(job) => {
                if let Err(e) = self.notifier.job_failed(&job, failure).await {
                    warn!(job_id, error = %e, "Failed to send failure notification");
                }
            }
            Err(e) => warn!(job_id, error = %e, "Failed to load job for notification"),
        }
    }

    async fn execute_with_retry(
        &self,
        executor: &dyn StageExecutor,
        mut ctx: StageContext,
    ) -> Result<StageOutcome> {
        let policy = &self.config.retry;
        let token = ctx.cancellation_token.clone();
        let job_id = ctx.job_id();

        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.attempt = attempt;
            let result = tokio::select! {
                _ = token.cancelled() => return Ok(StageOutcome::Cancelled),
                r = tokio::time::timeout(policy.attempt_timeout(), executor.execute(&ctx)) => r,
            };

            let (reason, transient) = match result {
                Ok(Ok(output)) => return Ok(StageOutcome::Succeeded(output)),
                Ok(Err(Error::StageFailed { reason, .. })) => (reason, false),
                Ok(Err(e)) => (e.to_string(), e.is_transient()),
                Err(_) => (
                    format!("attempt timed out after {:?}", policy.attempt_timeout()),
                    true,
                ),
            };

            self.log
                .append(
                    job_id,
                    JobLogEntry::warn(format!(
                        "{} attempt {}/{} failed: {}",
                        executor.name(),
                        attempt,
                        policy.max_attempts,
                        reason
                    )),
                )
                .await?;

            if !transient || !policy.has_attempts_left(attempt) {
                return Ok(StageOutcome::Failed(reason));
            }

            let delay = policy.backoff_after(attempt);
            debug!(job_id, attempt, ?delay, "Retrying stage");
            tokio::select! {
                _ = token.cancelled() => return Ok(StageOutcome::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Human edits and operator actions
    // ------------------------------------------------------------------

    /// Commit metadata at the checkpoint, or correct it in an idle state.
    pub async fn update_metadata(&self, job_id: i64, metadata: Metadata) -> Result<JobDetails> {
        metadata.validate()?;
        let guard = self.locks.try_acquire(job_id)?;
        let job = self.get_job(job_id).await?;
        let state = job.detailed_workflow_state;

        if state == WorkflowState::EditingMetadata {
            let transition = StateTransition::new(job_id, state, WorkflowState::FetchingVideo)
                .with_metadata(metadata)
                .with_metadata_committed()
                .with_log(JobLogEntry::info("Metadata committed; fetching video"));
            if !self.step(transition).await? {
                return Err(stale(job_id));
            }
            drop(guard);
            info!(job_id, "Metadata committed");
            self.queue.push(job_id);
        } else if state.accepts_metadata_correction() {
            let edit = ContentEdit {
                job_id,
                expected: state,
                metadata: Some(metadata),
                segments: None,
                logs: vec![JobLogEntry::info("Metadata corrected")],
            };
            if !self.repo.apply_content_edit(&edit).await? {
                return Err(stale(job_id));
            }
            drop(guard);
        } else {
            return Err(Error::conflict(format!(
                "metadata of job {job_id} cannot be edited while it is {state}"
            )));
        }

        self.job_details(job_id).await
    }

    /// Replace the transcript of a job that no stage is working on.
    pub async fn update_transcript(
        &self,
        job_id: i64,
        mut segments: Vec<Segment>,
    ) -> Result<JobDetails> {
        validate_transcript(&segments)?;
        let guard = self.locks.try_acquire(job_id)?;
        let job = self.get_job(job_id).await?;
        let state = job.detailed_workflow_state;
        if !state.accepts_transcript_edit() {
            return Err(Error::conflict(format!(
                "transcript of job {job_id} cannot be edited while it is {state}"
            )));
        }

        // Segments whose hash is unchanged keep their rendered clip.
        let clips: HashMap<String, String> = self
            .repo
            .get_segments(job_id)
            .await?
            .into_iter()
            .filter_map(|row| row.clip_key.map(|key| (row.segment_hash, key)))
            .collect();
        for segment in &mut segments {
            segment.clip_key = clips.get(&segment.segment_hash).cloned();
        }

        let count = segments.len();
        let edit = ContentEdit {
            job_id,
            expected: state,
            metadata: None,
            segments: Some(segments),
            logs: vec![JobLogEntry::info(format!(
                "Transcript replaced ({count} segments)"
            ))],
        };
        if !self.repo.apply_content_edit(&edit).await? {
            return Err(stale(job_id));
        }
        drop(guard);

        self.job_details(job_id).await
    }

    /// Force a non-terminal job to `failed`.
    ///
    /// Does not wait for the job's lock: a worker stuck in a stage would hold
    /// it indefinitely. The guarded transition orders this against the
    /// worker's own commit, and the worker's stage is cancelled.
    pub async fn force_fail(&self, job_id: i64, reason: &str) -> Result<Job> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::validation("reason cannot be empty"));
        }

        // The state may move between the read and the write; re-read a few times.
        for _ in 0..3 {
            let job = self.get_job(job_id).await?;
            let state = job.detailed_workflow_state;
            if state.is_terminal() {
                return Err(Error::conflict(format!(
                    "job {job_id} is already {state}"
                )));
            }
            let stage = state.stage().unwrap_or_else(|| {
                Stage::from_progress_flags(
                    job.html_fetch_success,
                    job.metadata_edited_at.is_some(),
                    job.video_fetch_success,
                )
            });
            let failure = Failure::new(stage, format!("forced by operator: {reason}"));
            let transition = StateTransition::fail(job_id, state, failure.clone())
                .with_log(JobLogEntry::error(failure.to_string()));

            if self.step(transition).await? {
                if let Some((_, token)) = self.cancellation_tokens.remove(&job_id) {
                    token.cancel();
                }
                warn!(job_id, %state, reason, "Job forced to fail");
                self.notify_failed(job_id, &failure).await;
                return self.get_job(job_id).await;
            }
        }
        Err(stale(job_id))
    }

    /// Stop in-flight stages; their jobs stay where they are and resume on restart.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn stale(job_id: i64) -> Error {
    Error::conflict(format!("job {job_id} changed concurrently; retry the request"))
}

fn validate_source_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation("url is required"));
    }
    let parsed =
        url::Url::parse(raw).map_err(|e| Error::validation(format!("invalid url '{raw}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::validation(format!(
            "url must be an http(s) address: {raw}"
        )));
    }
    Ok(raw.to_string())
}

fn validate_email(raw: &str) -> Result<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email.to_string())
        }
        _ => Err(Error::validation(format!("invalid user_email: '{email}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxJobRepository;
    use crate::database::{Database, DatabaseConfig};
    use crate::media::{LocalMediaBackend, MediaBackend, MediaConfig};
    use crate::pipeline::executors::{ClipGenerator, HtmlFetcher, PageSource, VideoFetcher};
    use async_trait::async_trait;
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Notifier {}

        #[async_trait]
        impl Notifier for Notifier {
            async fn job_ready_for_review(&self, job: &Job) -> Result<()>;
            async fn job_completed(&self, job: &Job) -> Result<()>;
            async fn job_failed(&self, job: &Job, failure: &Failure) -> Result<()>;
        }
    }

    struct DraftPage;

    #[async_trait]
    impl StageExecutor for DraftPage {
        fn stage(&self) -> Stage {
            Stage::HtmlFetch
        }

        fn name(&self) -> &'static str {
            "draft_page"
        }

        async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput> {
            Ok(StageOutput::default().log(JobLogEntry::info("draft parsed")))
        }
    }

    struct StaticPage(String);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn panel_page(transcript: &str) -> Arc<HtmlFetcher> {
        let html = format!(
            r#"<html><head><title>Panel</title></head><body>
<iframe src="https://www.youtube.com/embed/pnl2024"></iframe>
<div id="transcript0">{transcript}</div></body></html>"#
        );
        Arc::new(HtmlFetcher::new(Arc::new(StaticPage(html))))
    }

    async fn orchestrator(dir: &TempDir, notifier: MockNotifier) -> WorkflowOrchestrator {
        orchestrator_with_page(dir, Arc::new(DraftPage), notifier).await
    }

    async fn orchestrator_with_page(
        dir: &TempDir,
        page: Arc<dyn StageExecutor>,
        notifier: MockNotifier,
    ) -> WorkflowOrchestrator {
        let config = DatabaseConfig::new(format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("jobs.db").display()
        ));
        let db = Database::connect(&config).await.unwrap();
        let repo = Arc::new(SqlxJobRepository::new(db.read, db.write));
        let media: Arc<dyn MediaBackend> = Arc::new(LocalMediaBackend::new(MediaConfig {
            video_dir: dir.path().join("videos"),
            clip_dir: dir.path().join("clips"),
        }));
        let executors = StageExecutors::new(
            page,
            Arc::new(VideoFetcher::new(media.clone())),
            Arc::new(ClipGenerator::new(media)),
        );
        WorkflowOrchestrator::new(repo, executors).with_notifier(Arc::new(notifier))
    }

    #[tokio::test]
    async fn test_checkpoint_notifies_submitter_once() {
        let dir = TempDir::new().unwrap();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_job_ready_for_review()
            .withf(|job| job.detailed_workflow_state == WorkflowState::EditingMetadata)
            .times(1)
            .returning(|_| Ok(()));
        notifier.expect_job_completed().never();
        notifier.expect_job_failed().never();
        let orchestrator = orchestrator(&dir, notifier).await;

        let job = orchestrator.submit("https://x.test/a", "a@b.com").await.unwrap();
        orchestrator.advance(job.id).await.unwrap();
        orchestrator.advance(job.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_job() {
        let dir = TempDir::new().unwrap();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_job_ready_for_review()
            .returning(|_| Err(Error::Other("smtp down".to_string())));
        notifier
            .expect_job_failed()
            .withf(|_, failure| failure.at_stage == Stage::MetadataEdit)
            .times(1)
            .returning(|_, _| Ok(()));
        let orchestrator = orchestrator(&dir, notifier).await;

        let job = orchestrator.submit("https://x.test/a", "a@b.com").await.unwrap();
        orchestrator.advance(job.id).await.unwrap();
        let job = orchestrator.get_job(job.id).await.unwrap();
        assert_eq!(job.detailed_workflow_state, WorkflowState::EditingMetadata);

        orchestrator.force_fail(job.id, "wrong talk").await.unwrap();
    }

    #[tokio::test]
    async fn test_speakers_repeating_a_line_get_distinct_segments() {
        let dir = TempDir::new().unwrap();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_job_ready_for_review()
            .times(1)
            .returning(|_| Ok(()));
        let page = panel_page("Ada (00:10):<br>Thank you.<br>Bob (00:10):<br>Thank you.");
        let orchestrator = orchestrator_with_page(&dir, page, notifier).await;

        let job = orchestrator.submit("https://x.test/panel", "a@b.com").await.unwrap();
        orchestrator.advance(job.id).await.unwrap();

        let details = orchestrator.job_details(job.id).await.unwrap();
        assert_eq!(
            details.job.detailed_workflow_state,
            WorkflowState::EditingMetadata
        );
        let speakers: Vec<_> = details.transcript.iter().map(|s| s.speaker.as_str()).collect();
        assert_eq!(speakers, ["Ada", "Bob"]);
        assert_ne!(
            details.transcript[0].segment_hash,
            details.transcript[1].segment_hash
        );
    }

    #[tokio::test]
    async fn test_unusable_page_transcript_fails_the_stage() {
        let dir = TempDir::new().unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_job_ready_for_review().never();
        notifier
            .expect_job_failed()
            .withf(|_, failure| failure.at_stage == Stage::HtmlFetch)
            .times(1)
            .returning(|_, _| Ok(()));
        // The continuation header repeats speaker, line and timestamp.
        let page = panel_page("Ada (00:10):<br>Thank you.<br>(00:10):<br>Thank you.");
        let orchestrator = orchestrator_with_page(&dir, page, notifier).await;

        let job = orchestrator.submit("https://x.test/panel", "a@b.com").await.unwrap();
        orchestrator.advance(job.id).await.unwrap();

        let details = orchestrator.job_details(job.id).await.unwrap();
        assert_eq!(details.job.detailed_workflow_state, WorkflowState::Failed);
        assert_eq!(details.job.failed_stage(), Some(Stage::HtmlFetch));
        assert!(!details.job.html_fetch_success);
        assert!(details.transcript.is_empty());
        assert!(orchestrator.job_log(job.id).await.unwrap().contains("duplicate segment_hash"));

        // Another dispatch finds a terminal job and leaves it alone.
        orchestrator.advance(job.id).await.unwrap();
        assert!(orchestrator.locks().is_empty());
    }

    #[test]
    fn test_source_url_validation() {
        assert_eq!(
            validate_source_url(" https://x.test/a ").unwrap(),
            "https://x.test/a"
        );
        assert!(validate_source_url("").is_err());
        assert!(validate_source_url("ftp://x.test/a").is_err());
        assert!(validate_source_url("not a url").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert_eq!(validate_email("a@b.com").unwrap(), "a@b.com");
        assert!(validate_email("").is_err());
        assert!(validate_email("ab.com").is_err());
        assert!(validate_email("@b.com").is_err());
        assert!(validate_email("a@b@c").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::default();
        assert!(config.resume_interrupted);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
