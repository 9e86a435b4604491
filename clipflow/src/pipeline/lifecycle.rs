//! Content deletion and archive purges.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::job_locks::JobLocks;
use crate::database::models::JobLogEntry;
use crate::database::repositories::{JobRepository, StateTransition};
use crate::domain::{Failure, Stage, WorkflowState};
use crate::media::MediaBackend;
use crate::{Error, Result};

/// Finished operations stay queryable this long.
const PURGE_RETENTION_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How long a bulk purge is observed before it reports `abandoned`.
    pub observation_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            observation_timeout_secs: 30,
        }
    }
}

impl LifecycleConfig {
    /// Read `ARCHIVE_OBSERVATION_TIMEOUT_SECS`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Some(secs) = std::env::var("ARCHIVE_OBSERVATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.observation_timeout_secs = secs;
        }
        config
    }

    pub fn observation_timeout(&self) -> Duration {
        Duration::from_secs(self.observation_timeout_secs)
    }
}

/// Result of a single-job content deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentDeletion {
    Deleted,
    AlreadyDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurgeState {
    Running,
    Completed,
    /// Observation window elapsed; counters are frozen, deletion goes on.
    Abandoned,
}

/// Snapshot of a bulk purge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurgeProgress {
    pub operation_id: Uuid,
    pub total: u64,
    pub done: u64,
    /// Percentage of `total` purged, 0..=100.
    pub progress: u8,
    pub state: PurgeState,
    pub started_at: DateTime<Utc>,
}

/// Reported state; `frozen_done` is only read once abandoned.
#[derive(Debug)]
struct Observation {
    state: PurgeState,
    frozen_done: u64,
}

/// Live counters of one bulk purge.
#[derive(Debug)]
pub struct ArchivePurge {
    id: Uuid,
    total: u64,
    done: AtomicU64,
    observation: parking_lot::Mutex<Observation>,
    started_at: DateTime<Utc>,
    finished: CancellationToken,
}

impl ArchivePurge {
    fn new(total: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            total,
            done: AtomicU64::new(0),
            observation: parking_lot::Mutex::new(Observation {
                state: PurgeState::Running,
                frozen_done: 0,
            }),
            started_at: Utc::now(),
            finished: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn record_done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(&self) {
        let mut observation = self.observation.lock();
        if observation.state == PurgeState::Running {
            observation.state = PurgeState::Completed;
        }
        drop(observation);
        self.finished.cancel();
    }

    /// Freeze the observed counters unless the purge already completed.
    ///
    /// The counter is read under the same lock readers take, so a reader
    /// never sees a running count above the frozen one.
    fn abandon(&self) -> bool {
        let mut observation = self.observation.lock();
        if observation.state != PurgeState::Running {
            return false;
        }
        observation.frozen_done = self.done.load(Ordering::SeqCst);
        observation.state = PurgeState::Abandoned;
        true
    }

    fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    pub fn progress(&self) -> PurgeProgress {
        let (state, done) = {
            let observation = self.observation.lock();
            match observation.state {
                PurgeState::Abandoned => (PurgeState::Abandoned, observation.frozen_done),
                state => (state, self.done.load(Ordering::SeqCst)),
            }
        };
        PurgeProgress {
            operation_id: self.id,
            total: self.total,
            done,
            progress: percent(done, self.total),
            state,
            started_at: self.started_at,
        }
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}

/// Deletes job content, one job at a time or the whole archive.
pub struct LifecycleManager {
    config: LifecycleConfig,
    repo: Arc<dyn JobRepository>,
    media: Arc<dyn MediaBackend>,
    locks: Arc<JobLocks>,
    purges: DashMap<Uuid, Arc<ArchivePurge>>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<JoinSet<()>>,
}

impl LifecycleManager {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        media: Arc<dyn MediaBackend>,
        locks: Arc<JobLocks>,
    ) -> Self {
        Self {
            config: LifecycleConfig::default(),
            repo,
            media,
            locks,
            purges: DashMap::new(),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Delete one job's generated content and mark it `deleted`.
    pub async fn delete_content(&self, job_id: i64) -> Result<ContentDeletion> {
        let _guard = self.locks.try_acquire(job_id)?;
        let row = self.repo.get_job(job_id).await?;
        let state = row.state()?;

        if state == WorkflowState::Deleted {
            debug!(job_id, "Content already deleted");
            return Ok(ContentDeletion::AlreadyDeleted);
        }
        if state.is_active_stage() {
            return Err(Error::conflict(format!(
                "job {job_id} is {state}; wait for the stage to finish or fail the job first"
            )));
        }

        let youtube_id = self
            .repo
            .get_metadata(job_id)
            .await?
            .map(|metadata| metadata.youtube_id);

        let deleted = StateTransition::new(job_id, WorkflowState::Failed, WorkflowState::Deleted)
            .with_purged_content()
            .with_log(JobLogEntry::info("Content deleted by operator"));

        let applied = if state.is_terminal() {
            let deleted = StateTransition { from: state, ..deleted };
            self.repo.apply_transition(&deleted).await?
        } else {
            let stage = state.stage().unwrap_or(Stage::HtmlFetch);
            let failed = StateTransition::fail(
                job_id,
                state,
                Failure::new(stage, "content deleted by operator"),
            );
            self.repo.apply_transitions(&[failed, deleted]).await?
        };
        if !applied {
            return Err(Error::conflict(format!(
                "job {job_id} changed concurrently; retry the request"
            )));
        }

        if let Some(youtube_id) = youtube_id {
            match self.media.delete_clips(&youtube_id).await {
                Ok(removed) => debug!(job_id, removed, "Removed clips"),
                Err(e) => warn!(job_id, error = %e, "Failed to remove clips"),
            }
        }

        info!(job_id, from = %state, "Job content deleted");
        Ok(ContentDeletion::Deleted)
    }

    /// Start purging every archived job; returns the snapshot at initiation.
    pub async fn delete_archive(&self) -> Result<PurgeProgress> {
        self.prune_finished();

        let job_ids = self.repo.list_archived_job_ids().await?;
        let purge = Arc::new(ArchivePurge::new(job_ids.len() as u64));
        self.purges.insert(purge.id(), purge.clone());
        info!(operation_id = %purge.id(), total = job_ids.len(), "Archive purge started");

        let mut tasks = self.tasks.lock();

        // Reap finished purge tasks so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}

        let observation_timeout = self.config.observation_timeout();
        let watched = purge.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = watched.finished.cancelled() => {}
                _ = tokio::time::sleep(observation_timeout) => {
                    if watched.abandon() {
                        warn!(
                            operation_id = %watched.id(),
                            done = watched.progress().done,
                            "Archive purge no longer observed; deletion continues"
                        );
                    }
                }
            }
        });

        tasks.spawn(run_purge(
            purge.clone(),
            job_ids,
            self.repo.clone(),
            self.media.clone(),
            self.locks.clone(),
            self.cancellation_token.clone(),
        ));

        Ok(purge.progress())
    }

    pub fn purge_status(&self, operation_id: Uuid) -> Result<PurgeProgress> {
        self.purges
            .get(&operation_id)
            .map(|purge| purge.progress())
            .ok_or_else(|| Error::not_found("archive operation", operation_id))
    }

    fn prune_finished(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(PURGE_RETENTION_SECS);
        self.purges
            .retain(|_, purge| !purge.is_finished() || purge.started_at > cutoff);
    }

    /// Cancel running purges between jobs and wait for them to stop.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while tasks.join_next().await.is_some() {}
    }
}

async fn run_purge(
    purge: Arc<ArchivePurge>,
    job_ids: Vec<i64>,
    repo: Arc<dyn JobRepository>,
    media: Arc<dyn MediaBackend>,
    locks: Arc<JobLocks>,
    cancellation_token: CancellationToken,
) {
    for job_id in job_ids {
        if cancellation_token.is_cancelled() {
            info!(operation_id = %purge.id(), "Archive purge cancelled");
            break;
        }
        // Counted even when skipped, so the operation still reaches 100%.
        if let Err(e) = purge_job(job_id, repo.as_ref(), media.as_ref(), &locks).await {
            warn!(operation_id = %purge.id(), job_id, error = %e, "Failed to purge job; skipping");
        }
        purge.record_done();
    }
    purge.complete();
    info!(operation_id = %purge.id(), done = purge.done.load(Ordering::SeqCst), "Archive purge finished");
}

/// Remove one job's clips, then its record.
///
/// A failed clip deletion keeps the record, and with it the YouTube id, so a
/// later purge can retry. The record goes last so the job list never shows a
/// job as gone before its content is.
async fn purge_job(
    job_id: i64,
    repo: &dyn JobRepository,
    media: &dyn MediaBackend,
    locks: &JobLocks,
) -> Result<()> {
    let _guard = locks.acquire(job_id).await;
    if let Some(metadata) = repo.get_metadata(job_id).await? {
        media.delete_clips(&metadata.youtube_id).await?;
    }
    if !repo.delete_job(job_id).await? {
        debug!(job_id, "Job already gone");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(5, 10), 50);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(12, 10), 100);
    }

    #[test]
    fn test_abandon_freezes_counters() {
        let purge = ArchivePurge::new(10);
        for _ in 0..3 {
            purge.record_done();
        }
        assert!(purge.abandon());
        purge.record_done();
        purge.complete();

        let progress = purge.progress();
        assert_eq!(progress.state, PurgeState::Abandoned);
        assert_eq!(progress.done, 3);
        assert_eq!(progress.progress, 30);
        assert!(purge.is_finished());
    }

    #[test]
    fn test_progress_never_goes_backwards_across_abandonment() {
        let purge = ArchivePurge::new(100_000);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..100_000 {
                    purge.record_done();
                }
            });
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(1));
                purge.abandon();
            });

            let mut last = 0;
            for _ in 0..50_000 {
                let done = purge.progress().done;
                assert!(done >= last, "progress went from {last} to {done}");
                last = done;
            }
        });
        assert_eq!(purge.progress().state, PurgeState::Abandoned);
    }

    #[test]
    fn test_completed_purge_cannot_be_abandoned() {
        let purge = ArchivePurge::new(2);
        purge.record_done();
        purge.record_done();
        purge.complete();
        assert!(!purge.abandon());

        let progress = purge.progress();
        assert_eq!(progress.state, PurgeState::Completed);
        assert_eq!(progress.progress, 100);
    }

    #[test]
    fn test_config_default() {
        assert_eq!(
            LifecycleConfig::default().observation_timeout(),
            Duration::from_secs(30)
        );
    }
}
