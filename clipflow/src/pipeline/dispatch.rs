//! Queue of jobs waiting for a worker.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    order: VecDeque<i64>,
    queued: HashSet<i64>,
}

/// FIFO of job ids ready to be advanced, deduplicated.
///
/// Pushing wakes one idle worker; workers also poll on an interval, so a
/// missed wakeup only delays pickup.
#[derive(Default)]
pub struct DispatchQueue {
    inner: Mutex<Inner>,
    notify: Arc<Notify>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job; returns false if it is already waiting.
    pub fn push(&self, job_id: i64) -> bool {
        let inserted = {
            let mut inner = self.inner.lock();
            if inner.queued.insert(job_id) {
                inner.order.push_back(job_id);
                true
            } else {
                false
            }
        };
        if inserted {
            self.notify.notify_one();
        }
        inserted
    }

    pub fn pop(&self) -> Option<i64> {
        let mut inner = self.inner.lock();
        let job_id = inner.order.pop_front()?;
        inner.queued.remove(&job_id);
        Some(job_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
