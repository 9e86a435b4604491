//! Repository layer for database access.

pub mod job;

pub use job::{ContentEdit, JobFilter, JobRepository, MAX_LIST_LIMIT, SqlxJobRepository, StateTransition};
