//! The encounter transaction wire model.
//!
//! Requests and responses share these types. Server-assigned fields (`encounterUuid`,
//! observation `uuid`, order `uuid`, ...) are optional on input and filled in on output.

use crate::codes::{AdtAction, Certainty, DiagnosisOrder};
use crate::orders::{DrugOrder, TestOrder};
use crate::{EtError, EtResult};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncounterTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_uuid: Option<EmrUuid>,
    pub patient_uuid: EmrUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_type_uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_type_uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
    #[serde(default)]
    pub drug_orders: Vec<DrugOrder>,
    #[serde(default)]
    pub test_orders: Vec<TestOrder>,
    /// Response only: the ADT action the saved disposition asks for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adt_action: Option<AdtAction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub uuid: EmrUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter_role: Option<String>,
}

/// A reference to a concept by uuid or by name.
///
/// Requests usually carry only `uuid`; responses fill in the descriptive fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_class: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub set: bool,
}

impl ConceptRef {
    pub fn by_uuid(uuid: EmrUuid) -> Self {
        Self {
            uuid: Some(uuid),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// An observation value as it appears on the wire.
///
/// Datetime values travel as RFC 3339 text; the concept's datatype decides how text is read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObsValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    Concept(ConceptRef),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Observation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EmrUuid>,
    pub concept: ConceptRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ObsValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_members: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_uuid: Option<EmrUuid>,
}

impl Observation {
    pub fn new(concept: ConceptRef, value: Option<ObsValue>) -> Self {
        Self {
            uuid: None,
            concept,
            value,
            group_members: Vec::new(),
            comment: None,
            voided: false,
            void_reason: None,
            observation_date_time: None,
            form_namespace: None,
            form_field_path: None,
            order_uuid: None,
        }
    }
}

/// A diagnosis recorded in an encounter.
///
/// Exactly one of `coded_answer` and `free_text_answer` must be set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Diagnosis {
    /// The obs group backing this diagnosis, when editing or voiding an existing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_obs: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coded_answer: Option<ConceptRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_text_answer: Option<String>,
    pub certainty: Certainty,
    pub order: DiagnosisOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// A coded clinical decision such as admit or discharge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Disposition {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_obs: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub voided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_obs: Vec<Observation>,
}

// ============================================================================
// Parse / render
// ============================================================================

impl EncounterTransaction {
    /// An empty transaction for `patient_uuid`.
    pub fn for_patient(patient_uuid: EmrUuid) -> Self {
        Self {
            encounter_uuid: None,
            visit_uuid: None,
            patient_uuid,
            encounter_type_uuid: None,
            visit_type_uuid: None,
            location_uuid: None,
            encounter_date_time: None,
            providers: Vec::new(),
            observations: Vec::new(),
            diagnoses: Vec::new(),
            disposition: None,
            drug_orders: Vec::new(),
            test_orders: Vec::new(),
            adt_action: None,
        }
    }

    /// Parse an encounter transaction from JSON text.
    ///
    /// Uses `serde_path_to_error` so a schema mismatch names the failing field
    /// (e.g. `diagnoses[0].certainty`).
    ///
    /// # Errors
    ///
    /// Returns [`EtError::Translation`] if the JSON does not match the wire schema, including
    /// unknown keys and non-canonical UUIDs.
    pub fn parse(json_text: &str) -> EtResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        serde_path_to_error::deserialize::<_, EncounterTransaction>(&mut deserializer).map_err(
            |err| {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>".to_string()
                } else {
                    path
                };
                EtError::Translation(format!(
                    "Encounter transaction schema mismatch at {path}: {source}"
                ))
            },
        )
    }

    /// Render as pretty-printed JSON.
    pub fn render(&self) -> EtResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            EtError::Translation(format!("Failed to serialize encounter transaction: {e}"))
        })
    }
}

impl Diagnosis {
    /// Checks the coded/free-text exclusivity rule.
    pub fn validate_answer(&self) -> EtResult<()> {
        let free_text = self
            .free_text_answer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match (&self.coded_answer, free_text) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(EtError::InvalidInput(
                "diagnosis cannot carry both a coded and a free-text answer".into(),
            )),
            (None, None) => Err(EtError::InvalidInput(
                "diagnosis requires a coded or a free-text answer".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::OrderAction;

    const PATIENT: &str = "a4f91c6d-3b2e-4c5f-9d7a-1e8b6c0a9f12";

    fn sample() -> String {
        format!(
            r#"{{
  "patientUuid": "{PATIENT}",
  "encounterTypeUuid": "7f4c2e9d-4b0a-4f3a-9a2c-0e9a6b5d1c88",
  "encounterDateTime": "2024-03-01T09:30:00Z",
  "providers": [{{ "uuid": "c1a8e2d4-9b7f-4e3a-8d2c-5f6e7a8b9c0d" }}],
  "observations": [
    {{ "concept": {{ "uuid": "5089aaaa-0000-4000-8000-000000000001" }}, "value": 72.5 }},
    {{ "concept": {{ "uuid": "5089aaaa-0000-4000-8000-000000000002" }}, "value": "feels better" }},
    {{ "concept": {{ "uuid": "5089aaaa-0000-4000-8000-000000000003" }},
       "value": {{ "uuid": "5089aaaa-0000-4000-8000-000000000004" }} }}
  ],
  "diagnoses": [
    {{ "codedAnswer": {{ "uuid": "5089aaaa-0000-4000-8000-000000000005" }},
       "certainty": "CONFIRMED", "order": "PRIMARY" }},
    {{ "freeTextAnswer": "Odd rash", "certainty": "PRESUMED", "order": "SECONDARY" }}
  ],
  "disposition": {{ "code": "ADMIT" }},
  "drugOrders": [
    {{ "action": "NEW", "drug": {{ "name": "Paracetamol 500mg" }},
       "dosingInstructions": {{ "dose": 2, "doseUnits": "Tablet", "frequency": "Twice a day" }},
       "orderGroup": {{ "orderSetUuid": "0b7e3f1a-2c4d-4e5f-8a9b-1c2d3e4f5a6b" }} }}
  ],
  "testOrders": [
    {{ "concept": {{ "uuid": "5089aaaa-0000-4000-8000-000000000006" }}, "urgency": "STAT" }}
  ]
}}"#
        )
    }

    #[test]
    fn parses_full_transaction() {
        let et = EncounterTransaction::parse(&sample()).expect("parse sample");
        assert_eq!(et.patient_uuid.to_string(), PATIENT);
        assert_eq!(et.observations.len(), 3);
        assert_eq!(et.observations[0].value, Some(ObsValue::Number(72.5)));
        assert_eq!(
            et.observations[1].value,
            Some(ObsValue::Text("feels better".into()))
        );
        assert!(matches!(
            et.observations[2].value,
            Some(ObsValue::Concept(ConceptRef { uuid: Some(_), .. }))
        ));
        assert_eq!(et.diagnoses[1].order, DiagnosisOrder::Secondary);
        assert_eq!(et.disposition.as_ref().map(|d| d.code.as_str()), Some("ADMIT"));
        assert_eq!(et.drug_orders[0].header.action, OrderAction::New);
        assert_eq!(et.drug_orders[0].dosing_instructions.dose, Some(2.0));
        assert!(et.drug_orders[0].header.order_group.is_some());
        assert_eq!(et.test_orders[0].header.urgency.as_deref(), Some("STAT"));
    }

    #[test]
    fn render_then_parse_preserves_content() {
        let et = EncounterTransaction::parse(&sample()).unwrap();
        let rendered = et.render().unwrap();
        assert!(rendered.contains("\"patientUuid\""));
        assert_eq!(EncounterTransaction::parse(&rendered).unwrap(), et);
    }

    #[test]
    fn reports_path_of_bad_field() {
        let bad = sample().replace("\"CONFIRMED\"", "\"MAYBE\"");
        match EncounterTransaction::parse(&bad) {
            Err(EtError::Translation(msg)) => assert!(msg.contains("diagnoses[0].certainty"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let bad = sample().replacen('{', "{ \"surprise\": 1,", 1);
        match EncounterTransaction::parse(&bad) {
            Err(EtError::Translation(msg)) => assert!(msg.contains("surprise"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_canonical_patient_uuid() {
        let bad = sample().replace(PATIENT, "A4F91C6D3B2E4C5F9D7A1E8B6C0A9F12");
        assert!(EncounterTransaction::parse(&bad).is_err());
    }

    #[test]
    fn diagnosis_answer_must_be_exclusive() {
        let et = EncounterTransaction::parse(&sample()).unwrap();
        assert!(et.diagnoses[0].validate_answer().is_ok());
        assert!(et.diagnoses[1].validate_answer().is_ok());

        let mut both = et.diagnoses[0].clone();
        both.free_text_answer = Some("also this".into());
        assert!(both.validate_answer().is_err());

        let mut neither = et.diagnoses[0].clone();
        neither.coded_answer = None;
        neither.free_text_answer = Some("   ".into());
        assert!(neither.validate_answer().is_err());
    }
}
