//! Database models for clipflow.
//!
//! These models map directly to the database schema and convert into the
//! domain types used by the rest of the crate.

pub mod job;
pub mod job_log;

pub use job::*;
pub use job_log::*;
