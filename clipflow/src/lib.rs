//! clipflow library crate.
//!
//! Supervised ingestion of video pages: each submitted URL becomes a job that
//! fetches the page, waits for a human to confirm its metadata, fetches the
//! video and cuts one clip per transcript segment.

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod media;
pub mod notification;
pub mod pipeline;

pub use error::{Error, Result};
