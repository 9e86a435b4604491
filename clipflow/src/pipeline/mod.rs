//! Job pipeline: stage executors, the workflow orchestrator, the worker pool
//! that drives it, and lifecycle operations on finished jobs.
//!
//! - Jobs are dispatched by id and advanced by a fixed pool of workers
//! - One writer per job at a time, enforced by [`JobLocks`]
//! - Stage attempts are bounded by a retry policy and a per-attempt timeout
//! - Archive purges run in the background and report progress

mod dispatch;
pub mod executors;
mod job_locks;
mod lifecycle;
mod log;
mod orchestrator;
mod worker_pool;

pub use dispatch::DispatchQueue;
pub use executors::{
    ClipGenerator, HtmlFetcher, HttpClientConfig, HttpPageSource, PageSource, StageContext,
    StageExecutor, StageExecutors, StageOutput, VideoFetcher,
};
pub use job_locks::{JobGuard, JobLocks};
pub use lifecycle::{
    ArchivePurge, ContentDeletion, LifecycleConfig, LifecycleManager, PurgeProgress, PurgeState,
};
pub use log::{JobLog, LogLevel, render_entries, render_line};
pub use orchestrator::{OrchestratorConfig, WorkflowEvent, WorkflowOrchestrator};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
