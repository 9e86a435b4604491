//! Notifications sent to job submitters.
//!
//! Delivery (email) is an external service. The pipeline only reports events
//! through a [`Notifier`]; failures to notify never affect job state.

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::domain::{Failure, Job};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// The job reached the metadata checkpoint.
    async fn job_ready_for_review(&self, job: &Job) -> Result<()>;

    async fn job_completed(&self, job: &Job) -> Result<()>;

    async fn job_failed(&self, job: &Job, failure: &Failure) -> Result<()>;
}

/// Notifier that writes each message to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn job_ready_for_review(&self, job: &Job) -> Result<()> {
        info!(
            job_id = job.id,
            to = %job.user_email,
            "Notify: job ready for metadata review ({})",
            job.url
        );
        Ok(())
    }

    async fn job_completed(&self, job: &Job) -> Result<()> {
        info!(job_id = job.id, to = %job.user_email, "Notify: job completed ({})", job.url);
        Ok(())
    }

    async fn job_failed(&self, job: &Job, failure: &Failure) -> Result<()> {
        info!(
            job_id = job.id,
            to = %job.user_email,
            stage = %failure.at_stage,
            "Notify: job failed ({}): {}",
            job.url,
            failure.reason
        );
        Ok(())
    }
}
