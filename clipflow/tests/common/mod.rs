//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use clipflow::database::models::JobLogEntry;
use clipflow::database::repositories::{JobRepository, SqlxJobRepository};
use clipflow::database::{Database, DatabaseConfig};
use clipflow::domain::{Job, Metadata, RetryPolicy, Segment, Stage, WorkflowState};
use clipflow::media::{ClipRequest, MediaBackend};
use clipflow::pipeline::{
    ClipGenerator, JobLocks, LifecycleConfig, LifecycleManager, OrchestratorConfig, StageContext,
    StageExecutor, StageExecutors, StageOutput, VideoFetcher, WorkflowOrchestrator,
};
use clipflow::{Error, Result};

pub const SOURCE_URL: &str = "https://talks.test/sessions/keynote";
pub const USER_EMAIL: &str = "editor@talks.test";

pub fn metadata() -> Metadata {
    Metadata {
        title: "Opening keynote".to_string(),
        date: "2024-05-01".to_string(),
        youtube_id: "kn2024".to_string(),
        source: SOURCE_URL.to_string(),
    }
}

pub fn segment(hash: &str, start: f64, end: f64) -> Segment {
    Segment {
        segment_hash: hash.to_string(),
        text: format!("segment {hash}"),
        speaker: "Ada".to_string(),
        company: "Acme".to_string(),
        start_time: start,
        end_time: end,
        subjects: vec!["keynote".to_string()],
        clip_key: None,
    }
}

/// HTML stage that returns a fixed draft without touching the network.
pub struct ScriptedPage;

#[async_trait]
impl StageExecutor for ScriptedPage {
    fn stage(&self) -> Stage {
        Stage::HtmlFetch
    }

    fn name(&self) -> &'static str {
        "scripted-page"
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<StageOutput> {
        Ok(StageOutput {
            metadata: Some(Metadata {
                title: "Draft title".to_string(),
                ..metadata()
            }),
            segments: Some(vec![segment("aa11", 0.0, 4.5), segment("bb22", 4.5, 9.0)]),
            ..Default::default()
        }
        .log(JobLogEntry::info("Parsed scripted page")))
    }
}

/// In-memory media backend with switches for failures and stalls.
#[derive(Default)]
pub struct TestMedia {
    pub fail_fetch: AtomicBool,
    /// When set, `fetch_video` waits for a permit before returning.
    pub fetch_gate: Option<Arc<Semaphore>>,
    /// When set, `delete_clips` waits for a permit before returning.
    pub delete_gate: Option<Arc<Semaphore>>,
    pub fetch_calls: AtomicU32,
    pub deleted: Mutex<Vec<String>>,
}

impl TestMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let media = Self::default();
        media.fail_fetch.store(true, Ordering::SeqCst);
        media
    }

    pub fn with_fetch_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    pub fn with_delete_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.delete_gate = Some(gate);
        self
    }
}

#[async_trait]
impl MediaBackend for TestMedia {
    async fn fetch_video(&self, youtube_id: &str) -> Result<String> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.acquire()
                .await
                .map_err(|_| Error::Other("fetch gate closed".to_string()))?
                .forget();
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Other("upstream returned 503".to_string()));
        }
        Ok(format!("mem://videos/{youtube_id}.mp4"))
    }

    async fn render_clip(&self, _video_location: &str, clip: &ClipRequest<'_>) -> Result<String> {
        Ok(format!("clips/{}_{}.mp4", clip.youtube_id, clip.segment_hash))
    }

    async fn delete_clips(&self, youtube_id: &str) -> Result<u64> {
        if let Some(gate) = &self.delete_gate {
            gate.acquire()
                .await
                .map_err(|_| Error::Other("delete gate closed".to_string()))?
                .forget();
        }
        self.deleted.lock().push(youtube_id.to_string());
        Ok(1)
    }
}

/// A database in a temp dir with an orchestrator and a lifecycle manager on top.
pub struct Harness {
    _dir: TempDir,
    pub db: Database,
    pub repo: Arc<dyn JobRepository>,
    pub media: Arc<TestMedia>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub lifecycle: Arc<LifecycleManager>,
}

pub struct HarnessBuilder {
    media: TestMedia,
    retry: RetryPolicy,
    lifecycle: LifecycleConfig,
}

impl HarnessBuilder {
    pub fn media(mut self, media: TestMedia) -> Self {
        self.media = media;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn observation_timeout_secs(mut self, secs: u64) -> Self {
        self.lifecycle.observation_timeout_secs = secs;
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("clipflow.db").display()
        ));
        let db = Database::connect(&config).await.unwrap();
        let repo: Arc<dyn JobRepository> =
            Arc::new(SqlxJobRepository::new(db.read.clone(), db.write.clone()));

        let media = Arc::new(self.media);
        let backend: Arc<dyn MediaBackend> = media.clone();
        let executors = StageExecutors::new(
            Arc::new(ScriptedPage),
            Arc::new(VideoFetcher::new(backend.clone())),
            Arc::new(ClipGenerator::new(backend.clone())),
        );

        let locks = Arc::new(JobLocks::new());
        let orchestrator = Arc::new(
            WorkflowOrchestrator::new(repo.clone(), executors)
                .with_config(OrchestratorConfig::default().with_retry(self.retry))
                .with_locks(locks.clone()),
        );
        let lifecycle = Arc::new(
            LifecycleManager::new(repo.clone(), backend, locks).with_config(self.lifecycle),
        );

        Harness {
            _dir: dir,
            db,
            repo,
            media,
            orchestrator,
            lifecycle,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            media: TestMedia::new(),
            retry: RetryPolicy::single_attempt(),
            lifecycle: LifecycleConfig::default(),
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    /// Submit a job and run it to the metadata checkpoint.
    pub async fn job_at_checkpoint(&self) -> Job {
        let job = self.orchestrator.submit(SOURCE_URL, USER_EMAIL).await.unwrap();
        self.orchestrator.advance(job.id).await.unwrap();
        let job = self.orchestrator.get_job(job.id).await.unwrap();
        assert_eq!(job.detailed_workflow_state, WorkflowState::EditingMetadata);
        job
    }

    /// Poll until the job reaches `state`, failing after five seconds.
    pub async fn wait_for_state(&self, job_id: i64, state: WorkflowState) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.orchestrator.get_job(job_id).await.unwrap();
            if job.detailed_workflow_state == state {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} stuck in {} waiting for {state}",
                job.detailed_workflow_state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Poll `check` until it holds, failing after five seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
