//! Keyword frequency: how often each meaningful word occurs in a record

use protego_common::config::KeywordFrequencyConfig;
use protego_common::models::{NewAnalysisOutput, ScrapedRecord};
use protego_common::AnalysisType;
use serde_json::Value;
use std::collections::HashMap;

use super::{base_metadata, AnalysisStrategy};
use crate::error::AnalysisError;
use crate::text::{is_stop_word, record_text, words};

pub struct KeywordFrequency {
    min_frequency: i64,
    min_keyword_length: usize,
    max_keywords: usize,
}

impl KeywordFrequency {
    pub fn new(config: &KeywordFrequencyConfig) -> Self {
        Self {
            min_frequency: config.min_frequency.max(1),
            min_keyword_length: config.min_keyword_length,
            max_keywords: config.max_keywords,
        }
    }

    /// Counted keywords, most frequent first, ties broken alphabetically
    pub fn count(&self, text: &str) -> Vec<(String, i64)> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for word in words(text) {
            if word.chars().count() < self.min_keyword_length || is_stop_word(&word) {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }

        let mut ranked: Vec<_> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.min_frequency)
            .collect();
        ranked.sort_by(|(a_word, a_count), (b_word, b_count)| {
            b_count.cmp(a_count).then_with(|| a_word.cmp(b_word))
        });
        ranked.truncate(self.max_keywords);
        ranked
    }
}

impl AnalysisStrategy for KeywordFrequency {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::KeywordFrequency
    }

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        let metadata = Value::Object(base_metadata(record));

        Ok(self
            .count(&record_text(record))
            .into_iter()
            .map(|(keyword, frequency)| NewAnalysisOutput {
                analysis_type: AnalysisType::KeywordFrequency,
                keyword,
                frequency,
                metadata: metadata.clone(),
            })
            .collect())
    }
}
