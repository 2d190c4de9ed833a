//! # Protego Common Library
//!
//! Shared code for the Protego pipeline services including:
//! - Record and analysis models (ScrapedRecord, AnalysisOutput)
//! - SQLite-backed store and the `Store` trait consumed by the pipeline
//! - Configuration loading
//! - Schedules and the single-flight job scheduler
//! - Pipeline event bus (PipelineEvent enum)
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod schedule;
pub mod scheduler;
pub mod time;

pub use error::{Error, Result, StoreError, StoreResult};
pub use models::{AnalysisType, SourceType};
