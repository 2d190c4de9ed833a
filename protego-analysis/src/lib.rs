//! # Protego Analysis
//!
//! Periodic enrichment of scraped records: keyword frequencies, condition
//! groups and categories, written once per record and analysis type.

pub mod engine;
pub mod error;
pub mod job;
pub mod selector;
pub mod strategies;
pub mod text;

pub use engine::{AnalysisEngine, BatchReport};
pub use error::AnalysisError;
pub use job::{AnalysisJob, AnalysisPassReport};
pub use selector::UnprocessedSelector;
pub use strategies::{AnalysisStrategy, Strategy};
