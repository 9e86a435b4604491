//! Worker pool that advances dispatched jobs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::dispatch::DispatchQueue;
use super::orchestrator::WorkflowOrchestrator;

/// Configuration for a worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum jobs advanced concurrently.
    pub max_workers: usize,
    /// Poll interval in milliseconds, a fallback for missed wakeups.
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 500,
        }
    }
}

impl WorkerPoolConfig {
    /// Read `WORKER_COUNT`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Some(count) = std::env::var("WORKER_COUNT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.max_workers = count;
        }
        config
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

/// A fixed set of workers pulling job ids from the dispatch queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    active_workers: Arc<AtomicUsize>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::with_config(WorkerPoolConfig::default())
    }

    pub fn with_config(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            active_workers: Arc::new(AtomicUsize::new(0)),
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Start the workers.
    pub fn start(&self, orchestrator: Arc<WorkflowOrchestrator>) {
        let queue: Arc<DispatchQueue> = orchestrator.queue();
        let poll_interval = std::time::Duration::from_millis(self.config.poll_interval_ms);

        info!("Starting worker pool with {} workers", self.config.max_workers);

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.config.max_workers {
                let semaphore = self.semaphore.clone();
                let cancellation_token = self.cancellation_token.clone();
                let active_workers = self.active_workers.clone();
                let orchestrator = orchestrator.clone();
                let queue = queue.clone();
                let notifier = queue.notifier();

                join_set.spawn(async move {
                    debug!("Worker {} started", i);

                    loop {
                        if cancellation_token.is_cancelled() {
                            debug!("Worker {} shutting down", i);
                            break;
                        }

                        let Some(job_id) = queue.pop() else {
                            tokio::select! {
                                _ = cancellation_token.cancelled() => break,
                                _ = notifier.notified() => {}
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                            continue;
                        };

                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        active_workers.fetch_add(1, Ordering::SeqCst);

                        debug!("Worker {} advancing job {}", i, job_id);
                        if let Err(e) = orchestrator.advance(job_id).await {
                            error!(job_id, error = %e, "Failed to advance job");
                        }

                        active_workers.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    }
                });
            }
        }
    }

    /// Stop the workers and wait for in-flight jobs to return.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        // Take the join set out of the mutex before awaiting
        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    /// Number of workers currently advancing a job.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
