//! # Protego Scraper
//!
//! Scheduled ingestion of public medical sources (FDA DailyMed drug labels,
//! ClinicalTrials.gov studies) into the shared record store.

pub mod error;
pub mod gate;
pub mod job;
pub mod sources;

pub use error::{FetchError, NormalizationError};
pub use gate::IngestionGate;
pub use job::{IngestionJob, IngestionReport, SourceReport};
pub use sources::{RawItem, Source, SourceAdapter};
