//! Analysis error types

use protego_common::{AnalysisType, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A strategy could not analyze a record; nothing is written for it
    #[error("{analysis_type} failed: {reason}")]
    Strategy {
        analysis_type: AnalysisType,
        reason: String,
    },

    /// A strategy could not be built from configuration
    #[error("Invalid {analysis_type} configuration: {reason}")]
    Config {
        analysis_type: AnalysisType,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AnalysisError {
    pub fn strategy(analysis_type: AnalysisType, reason: impl Into<String>) -> Self {
        AnalysisError::Strategy {
            analysis_type,
            reason: reason.into(),
        }
    }
}
