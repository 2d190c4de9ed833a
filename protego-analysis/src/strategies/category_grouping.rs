//! Category grouping: structured categories a record belongs to
//!
//! Trials are grouped by phase, study type, intervention type and lead
//! sponsor class; drug labels by route of administration and drug class.

use protego_common::models::{NewAnalysisOutput, ScrapedRecord};
use protego_common::{AnalysisType, SourceType};
use serde_json::{json, Value};

use super::{base_metadata, AnalysisStrategy};
use crate::error::AnalysisError;

pub struct CategoryGrouping;

/// (category value, category type) pairs, first occurrence of a value wins
#[derive(Default)]
struct Categories(Vec<(String, &'static str)>);

impl Categories {
    fn add(&mut self, value: Option<&Value>, category_type: &'static str) {
        let Some(value) = value.and_then(Value::as_str).map(str::trim) else {
            return;
        };
        if !value.is_empty() && !self.0.iter().any(|(v, _)| v == value) {
            self.0.push((value.to_string(), category_type));
        }
    }

    fn add_all(&mut self, values: Option<&Value>, category_type: &'static str) {
        if let Some(Value::Array(items)) = values {
            for item in items {
                self.add(Some(item), category_type);
            }
        }
    }
}

fn trial_categories(payload: &Value) -> Result<Categories, AnalysisError> {
    let mut categories = Categories::default();

    let protocol = match payload.get("protocolSection") {
        None => return Ok(categories),
        Some(protocol) if protocol.is_object() => protocol,
        Some(_) => {
            return Err(AnalysisError::strategy(
                AnalysisType::CategoryGrouping,
                "protocolSection is not an object",
            ))
        }
    };

    categories.add_all(protocol.pointer("/designModule/phases"), "phase");
    categories.add(protocol.pointer("/designModule/studyType"), "study_type");

    if let Some(Value::Array(interventions)) =
        protocol.pointer("/armsInterventionsModule/interventions")
    {
        for intervention in interventions {
            categories.add(intervention.get("type"), "intervention_type");
        }
    }

    categories.add(
        protocol.pointer("/sponsorCollaboratorsModule/leadSponsor/class"),
        "sponsor_type",
    );

    Ok(categories)
}

fn label_categories(payload: &Value) -> Categories {
    let mut categories = Categories::default();
    let first_text = |keys: [&str; 2]| {
        keys.into_iter()
            .filter_map(|key| payload.get(key))
            .find(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
    };

    categories.add(first_text(["route", "route_of_administration"]), "route");
    categories.add(first_text(["drug_class", "category"]), "drug_class");
    categories
}

impl AnalysisStrategy for CategoryGrouping {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::CategoryGrouping
    }

    fn analyze(&self, record: &ScrapedRecord) -> Result<Vec<NewAnalysisOutput>, AnalysisError> {
        let categories = match record.source_type {
            SourceType::ClinicalTrials => trial_categories(&record.payload)?,
            SourceType::FdaDrugLabels => label_categories(&record.payload),
        };

        Ok(categories
            .0
            .into_iter()
            .map(|(value, category_type)| {
                let mut metadata = base_metadata(record);
                metadata.insert("grouped_by".to_string(), json!("category"));
                metadata.insert("category_type".to_string(), json!(category_type));
                NewAnalysisOutput {
                    analysis_type: AnalysisType::CategoryGrouping,
                    keyword: value,
                    frequency: 1,
                    metadata: Value::Object(metadata),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protego_common::time;
    use uuid::Uuid;

    fn record(source_type: SourceType, payload: Value) -> ScrapedRecord {
        ScrapedRecord {
            id: Uuid::new_v4(),
            source_type,
            external_id: "X".to_string(),
            title: "t".to_string(),
            link: String::new(),
            payload,
            scraped_at: time::now(),
        }
    }

    fn pairs(outputs: &[NewAnalysisOutput]) -> Vec<(String, String)> {
        outputs
            .iter()
            .map(|o| {
                (
                    o.keyword.clone(),
                    o.metadata["category_type"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_trial_categories() {
        let payload = json!({
            "protocolSection": {
                "designModule": { "phases": ["PHASE2", "PHASE3"], "studyType": "INTERVENTIONAL" },
                "armsInterventionsModule": {
                    "interventions": [{ "type": "DRUG" }, { "type": "DRUG" }, { "type": "BEHAVIORAL" }]
                },
                "sponsorCollaboratorsModule": { "leadSponsor": { "class": "INDUSTRY" } }
            }
        });

        let outputs = CategoryGrouping
            .analyze(&record(SourceType::ClinicalTrials, payload))
            .unwrap();
        assert_eq!(
            pairs(&outputs),
            vec![
                ("PHASE2".to_string(), "phase".to_string()),
                ("PHASE3".to_string(), "phase".to_string()),
                ("INTERVENTIONAL".to_string(), "study_type".to_string()),
                ("DRUG".to_string(), "intervention_type".to_string()),
                ("BEHAVIORAL".to_string(), "intervention_type".to_string()),
                ("INDUSTRY".to_string(), "sponsor_type".to_string()),
            ]
        );
        assert!(outputs.iter().all(|o| o.frequency == 1));
    }

    #[test]
    fn test_label_categories() {
        let payload = json!({ "route": " ", "route_of_administration": "ORAL", "category": "NSAID" });
        let outputs = CategoryGrouping
            .analyze(&record(SourceType::FdaDrugLabels, payload))
            .unwrap();
        assert_eq!(
            pairs(&outputs),
            vec![
                ("ORAL".to_string(), "route".to_string()),
                ("NSAID".to_string(), "drug_class".to_string()),
            ]
        );
    }

    #[test]
    fn test_malformed_trial_is_an_error() {
        let err = CategoryGrouping
            .analyze(&record(SourceType::ClinicalTrials, json!({ "protocolSection": "oops" })))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Strategy { analysis_type: AnalysisType::CategoryGrouping, .. }
        ));
    }
}
