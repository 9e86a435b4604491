//! Per-job mutual exclusion.
//!
//! At most one writer (a worker running stages, a human edit, a content
//! deletion) holds a job at a time. Jobs never share a lock, so unrelated jobs
//! proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Error, Result};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

/// Registry of per-job async mutexes.
///
/// An entry lives only while someone holds or waits for the job.
#[derive(Default)]
pub struct JobLocks {
    locks: Arc<LockMap>,
}

/// Exclusive hold on one job; released on drop.
pub struct JobGuard {
    job_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl JobGuard {
    pub fn job_id(&self) -> i64 {
        self.job_id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the mutex, which keeps the entry.
        self.locks
            .remove_if(&self.job_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, job_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until the job is free, then hold it.
    pub async fn acquire(&self, job_id: i64) -> JobGuard {
        let guard = self.lock_for(job_id).lock_owned().await;
        self.guard(job_id, guard)
    }

    /// Hold the job if nobody else does, otherwise fail with a conflict.
    pub fn try_acquire(&self, job_id: i64) -> Result<JobGuard> {
        let guard = self
            .lock_for(job_id)
            .try_lock_owned()
            .map_err(|_| Error::conflict(format!("job {job_id} is being modified")))?;
        Ok(self.guard(job_id, guard))
    }

    fn guard(&self, job_id: i64, guard: OwnedMutexGuard<()>) -> JobGuard {
        JobGuard {
            job_id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
