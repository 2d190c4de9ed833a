//! Analysis strategies
//!
//! A strategy is a pure function of one record to zero or more outputs of a
//! single analysis type. Strategies never touch the store.

pub mod category_grouping;
pub mod condition_grouping;
pub mod keyword_frequency;

use protego_common::config::AnalysisConfig;
use protego_common::models::{NewAnalysisOutput, ScrapedRecord};
use protego_common::AnalysisType;
use serde_json::{json, Value};

use crate::error::AnalysisError;

pub use category_grouping::CategoryGrouping;
pub use condition_grouping::ConditionGrouping;
pub use keyword_frequency::KeywordFrequency;

pub trait AnalysisStrategy: Send + Sync {
    fn analysis_type(&self) -> AnalysisType;

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError>;
}

pub enum Strategy {
    KeywordFrequency(KeywordFrequency),
    ConditionGrouping(ConditionGrouping),
    CategoryGrouping(CategoryGrouping),
}

impl Strategy {
    pub fn build(analysis_type: AnalysisType, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(match analysis_type {
            AnalysisType::KeywordFrequency => {
                Strategy::KeywordFrequency(KeywordFrequency::new(&config.keyword_frequency))
            }
            AnalysisType::ConditionGrouping => {
                Strategy::ConditionGrouping(ConditionGrouping::new(&config.condition_grouping)?)
            }
            AnalysisType::CategoryGrouping => Strategy::CategoryGrouping(CategoryGrouping),
        })
    }

    /// The configured strategies, in configuration order, each at most once
    pub fn from_config(config: &AnalysisConfig) -> Result<Vec<Strategy>, AnalysisError> {
        let mut seen = Vec::new();
        let mut strategies = Vec::new();
        for &analysis_type in &config.strategies {
            if seen.contains(&analysis_type) {
                continue;
            }
            seen.push(analysis_type);
            strategies.push(Self::build(analysis_type, config)?);
        }
        Ok(strategies)
    }

    fn inner(&self) -> &dyn AnalysisStrategy {
        match self {
            Strategy::KeywordFrequency(s) => s,
            Strategy::ConditionGrouping(s) => s,
            Strategy::CategoryGrouping(s) => s,
        }
    }
}

impl AnalysisStrategy for Strategy {
    fn analysis_type(&self) -> AnalysisType {
        self.inner().analysis_type()
    }

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        self.inner().analyze(record)
    }
}

/// Metadata fields every output carries
pub(crate) fn base_metadata(record: &ScrapedRecord) -> serde_json::Map<String, Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("source_type".to_string(), json!(record.source_type));
    metadata.insert("title".to_string(), json!(record.title));
    metadata
}
