//! Domain layer for clipflow.
//!
//! This module contains the workflow rules, entities, and value objects.

pub mod job;
pub mod retry_policy;
pub mod workflow;

pub use job::{Job, JobDetails, JobSummary, Metadata, Segment, validate_transcript};
pub use retry_policy::RetryPolicy;
pub use workflow::{Failure, JobStatus, Stage, WorkflowState};
