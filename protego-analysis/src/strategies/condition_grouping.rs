//! Condition grouping: which known medical conditions a record mentions
//!
//! Conditions come from two places. The configured vocabulary maps a
//! condition name to terms that are matched on word boundaries anywhere in
//! the record's text. The source may also declare conditions outright
//! (trial condition lists, label indications); those are emitted as well.

use protego_common::config::ConditionGroupingConfig;
use protego_common::models::{NewAnalysisOutput, ScrapedRecord};
use protego_common::{AnalysisType, SourceType};
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{base_metadata, AnalysisStrategy};
use crate::error::AnalysisError;
use crate::text::record_text;

/// Match positions kept per condition in output metadata
///
/// Spans are `[start, end]` byte offsets into the record text (title and
/// payload strings joined by single spaces), earliest first.
const MAX_SPANS: usize = 20;

struct Condition {
    name: String,
    terms: Vec<(String, Regex)>,
}

pub struct ConditionGrouping {
    conditions: Vec<Condition>,
}

impl ConditionGrouping {
    pub fn new(config: &ConditionGroupingConfig) -> Result<Self, AnalysisError> {
        let mut conditions = Vec::with_capacity(config.vocabulary.len());

        for (name, terms) in &config.vocabulary {
            let mut compiled = Vec::with_capacity(terms.len());
            for term in terms {
                let term = term.trim();
                if term.is_empty() {
                    continue;
                }
                let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AnalysisError::Config {
                        analysis_type: AnalysisType::ConditionGrouping,
                        reason: format!("term '{}' of '{}': {}", term, name, e),
                    })?;
                compiled.push((term.to_lowercase(), pattern));
            }
            conditions.push(Condition {
                name: name.clone(),
                terms: compiled,
            });
        }

        Ok(Self { conditions })
    }

    fn vocabulary_matches(&self, record: &ScrapedRecord, text: &str) -> Vec<NewAnalysisOutput> {
        let mut outputs = Vec::new();

        for condition in &self.conditions {
            let mut matched_terms: BTreeMap<&str, i64> = BTreeMap::new();
            let mut spans = Vec::new();
            let mut total = 0i64;

            for (term, pattern) in &condition.terms {
                for found in pattern.find_iter(text) {
                    total += 1;
                    *matched_terms.entry(term.as_str()).or_insert(0) += 1;
                    spans.push([found.start(), found.end()]);
                }
            }

            if total == 0 {
                continue;
            }

            spans.sort_unstable();
            spans.truncate(MAX_SPANS);
            let mut metadata = base_metadata(record);
            metadata.insert("grouped_by".to_string(), json!("condition"));
            metadata.insert("matched_terms".to_string(), json!(matched_terms));
            metadata.insert("spans".to_string(), json!(spans));

            outputs.push(NewAnalysisOutput {
                analysis_type: AnalysisType::ConditionGrouping,
                keyword: condition.name.clone(),
                frequency: total,
                metadata: Value::Object(metadata),
            });
        }

        outputs
    }
}

/// Conditions the source itself lists for the record
fn declared_conditions(record: &ScrapedRecord) -> Vec<String> {
    let payload = &record.payload;
    let mut found: Vec<&Value> = Vec::new();

    match record.source_type {
        SourceType::ClinicalTrials => {
            for pointer in [
                "/protocolSection/conditionsModule/conditions",
                "/protocolSection/conditionsModule/keywords",
            ] {
                if let Some(Value::Array(items)) = payload.pointer(pointer) {
                    found.extend(items);
                }
            }
        }
        SourceType::FdaDrugLabels => {
            if let Some(indication) = payload
                .get("indication")
                .filter(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
                .or_else(|| payload.get("indication_text"))
            {
                found.push(indication);
            }
            if let Some(Value::Array(items)) = payload.get("indications") {
                found.extend(items);
            }
        }
    }

    let mut conditions: Vec<String> = Vec::new();
    for value in found {
        let Some(text) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if !conditions.iter().any(|c| c.eq_ignore_ascii_case(text)) {
            conditions.push(text.to_string());
        }
    }
    conditions
}

impl AnalysisStrategy for ConditionGrouping {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::ConditionGrouping
    }

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        let text = record_text(record);
        let mut outputs = self.vocabulary_matches(record, &text);

        for declared in declared_conditions(record) {
            if let Some(existing) = outputs
                .iter_mut()
                .find(|o| o.keyword.eq_ignore_ascii_case(&declared))
            {
                existing.metadata["declared"] = json!(true);
                continue;
            }

            let mut metadata = base_metadata(record);
            metadata.insert("grouped_by".to_string(), json!("condition"));
            metadata.insert("declared".to_string(), json!(true));
            outputs.push(NewAnalysisOutput {
                analysis_type: AnalysisType::ConditionGrouping,
                keyword: declared,
                frequency: 1,
                metadata: Value::Object(metadata),
            });
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protego_common::time;
    use uuid::Uuid;

    fn record(source_type: SourceType, title: &str, payload: Value) -> ScrapedRecord {
        ScrapedRecord {
            id: Uuid::new_v4(),
            source_type,
            external_id: "X".to_string(),
            title: title.to_string(),
            link: String::new(),
            payload,
            scraped_at: time::now(),
        }
    }

    fn strategy() -> ConditionGrouping {
        ConditionGrouping::new(&ConditionGroupingConfig::default()).unwrap()
    }

    fn find<'a>(outputs: &'a [NewAnalysisOutput], keyword: &str) -> &'a NewAnalysisOutput {
        outputs
            .iter()
            .find(|o| o.keyword == keyword)
            .unwrap_or_else(|| panic!("no output for {}", keyword))
    }

    #[test]
    fn test_vocabulary_terms_group_into_conditions() {
        let outputs = strategy()
            .analyze(&record(
                SourceType::FdaDrugLabels,
                "",
                json!({ "text": "fever fever cough" }),
            ))
            .unwrap();

        assert_eq!(outputs.len(), 2);
        let fever = find(&outputs, "Fever");
        assert_eq!(fever.frequency, 2);
        assert_eq!(fever.metadata["matched_terms"]["fever"], 2);
        assert_eq!(fever.metadata["grouped_by"], "condition");
        assert_eq!(find(&outputs, "Respiratory Symptoms").frequency, 1);
    }

    #[test]
    fn test_matches_respect_word_boundaries_and_case() {
        let outputs = strategy()
            .analyze(&record(
                SourceType::ClinicalTrials,
                "PAIN relief",
                json!({ "text": "painless procedure; Shortness of Breath reported" }),
            ))
            .unwrap();

        let pain = find(&outputs, "Pain");
        assert_eq!(pain.frequency, 1);
        assert_eq!(pain.metadata["spans"], json!([[0, 4]]));
        assert_eq!(find(&outputs, "Respiratory Symptoms").frequency, 1);
    }

    #[test]
    fn test_declared_trial_conditions_are_merged() {
        let payload = json!({
            "protocolSection": {
                "conditionsModule": {
                    "conditions": ["Asthma", "COPD", "copd"],
                    "keywords": ["inhaler"]
                }
            }
        });
        let outputs = strategy()
            .analyze(&record(SourceType::ClinicalTrials, "", payload))
            .unwrap();

        // "Asthma" matched by vocabulary and declared: one output
        let asthma = find(&outputs, "Asthma");
        assert_eq!(asthma.metadata["declared"], true);
        assert!(asthma.frequency >= 1);

        let copd = find(&outputs, "COPD");
        assert_eq!(copd.frequency, 1);
        assert_eq!(copd.metadata["declared"], true);
        assert_eq!(outputs.iter().filter(|o| o.keyword.eq_ignore_ascii_case("copd")).count(), 1);
        find(&outputs, "inhaler");
    }

    #[test]
    fn test_declared_label_indications() {
        let payload = json!({ "indication": "Migraine", "indications": ["Tension headache"] });
        let outputs = strategy()
            .analyze(&record(SourceType::FdaDrugLabels, "", payload))
            .unwrap();

        find(&outputs, "Migraine");
        find(&outputs, "Tension headache");
        // "migraine" is a Pain term in the vocabulary
        assert_eq!(find(&outputs, "Pain").frequency, 1);
    }

    #[test]
    fn test_spans_are_capped() {
        let text = "cough ".repeat(30);
        let outputs = strategy()
            .analyze(&record(SourceType::FdaDrugLabels, "", json!({ "t": text })))
            .unwrap();

        let respiratory = find(&outputs, "Respiratory Symptoms");
        assert_eq!(respiratory.frequency, 30);
        assert_eq!(respiratory.metadata["spans"].as_array().unwrap().len(), MAX_SPANS);
    }

    #[test]
    fn test_custom_vocabulary() {
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert(
            "Rash".to_string(),
            vec!["rash".to_string(), "c++ rash".to_string(), "  ".to_string()],
        );
        let strategy = ConditionGrouping::new(&ConditionGroupingConfig { vocabulary }).unwrap();

        let outputs = strategy
            .analyze(&record(SourceType::FdaDrugLabels, "Rash", json!({})))
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].keyword, "Rash");
    }

    #[test]
    fn test_capped_spans_keep_document_order() {
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert(
            "Airway".to_string(),
            vec!["wheeze".to_string(), "cough".to_string()],
        );
        let strategy = ConditionGrouping::new(&ConditionGroupingConfig { vocabulary }).unwrap();
        let text = format!("cough {}", "wheeze ".repeat(25));

        let outputs = strategy
            .analyze(&record(SourceType::FdaDrugLabels, "", json!({ "t": text })))
            .unwrap();

        let airway = find(&outputs, "Airway");
        assert_eq!(airway.frequency, 26);
        let spans = airway.metadata["spans"].as_array().unwrap();
        assert_eq!(spans.len(), MAX_SPANS);
        // Text is the empty title, a space, then the payload string
        assert_eq!(spans[0], json!([1, 6]));
        assert_eq!(spans[1], json!([7, 13]));
    }
}
