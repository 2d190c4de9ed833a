//! Pipeline data model
//!
//! `ScrapedRecord` rows are created once per (source_type, external_id) by the
//! ingestion gate. `AnalysisOutput` rows are created by the analysis engine,
//! at most one per (scraped_record_id, analysis_type, keyword).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// External source a record was scraped from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// FDA DailyMed drug labels
    FdaDrugLabels,
    /// ClinicalTrials.gov studies
    ClinicalTrials,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::FdaDrugLabels, SourceType::ClinicalTrials];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::FdaDrugLabels => "FDA_DRUG_LABELS",
            SourceType::ClinicalTrials => "CLINICAL_TRIALS",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown source type: {}", s)))
    }
}

/// Kind of derived analysis, one per strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    KeywordFrequency,
    ConditionGrouping,
    CategoryGrouping,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 3] = [
        AnalysisType::KeywordFrequency,
        AnalysisType::ConditionGrouping,
        AnalysisType::CategoryGrouping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::KeywordFrequency => "KEYWORD_FREQUENCY",
            AnalysisType::ConditionGrouping => "CONDITION_GROUPING",
            AnalysisType::CategoryGrouping => "CATEGORY_GROUPING",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown analysis type: {}", s)))
    }
}

/// Normalized record produced by a source adapter, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScrapedRecord {
    pub source_type: SourceType,
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub payload: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

/// Stored scraped record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    pub source_type: SourceType,
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub payload: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedRecord {
    /// Keyset position of this record in `scraped_at` order
    pub fn cursor(&self) -> Cursor {
        Cursor {
            scraped_at: self.scraped_at,
            id: self.id,
        }
    }
}

/// Output of one strategy for one keyword, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysisOutput {
    pub analysis_type: AnalysisType,
    pub keyword: String,
    pub frequency: i64,
    pub metadata: serde_json::Value,
}

/// Stored analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub id: Uuid,
    pub scraped_record_id: Uuid,
    pub analysis_type: AnalysisType,
    pub keyword: String,
    pub frequency: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Everything one analysis pass produced for a single record
///
/// `analysis_types` lists every strategy that ran, including strategies that
/// produced no outputs; they are recorded as completed for the record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisBatch {
    pub analysis_types: Vec<AnalysisType>,
    pub outputs: Vec<NewAnalysisOutput>,
}

/// Result of writing one record's analysis batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OutputWrite {
    /// New rows written
    pub inserted: usize,
    /// Rows skipped because (record, type, keyword) was already stored
    pub skipped: usize,
}

/// Per-batch ingestion counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl IngestionSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.failed
    }
}

impl std::ops::AddAssign for IngestionSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Keyset pagination position: records strictly after (scraped_at, id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub scraped_at: DateTime<Utc>,
    pub id: Uuid,
}
