//! REST request and response bodies.
//!
//! Identifiers and dates travel as strings (canonical UUIDs, RFC 3339 datetimes, ISO dates);
//! clinical codes use their upper-case wire spelling (`ACTIVE`, `CONFIRMED`, ...). The encounter
//! transaction itself is not described here: its JSON is owned by the `encounter-transaction`
//! crate.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionReq {
    /// Uuid of the condition being revised; omit for a new condition.
    #[serde(default)]
    pub uuid: Option<String>,
    pub patient_uuid: String,
    #[serde(default)]
    pub concept_uuid: Option<String>,
    #[serde(default)]
    pub condition_non_coded: Option<String>,
    /// `ACTIVE`, `INACTIVE` or `HISTORY_OF`.
    pub status: String,
    /// `CONFIRMED` or `PRESUMED`.
    #[serde(default)]
    pub verification: Option<String>,
    #[serde(default)]
    pub onset_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub end_reason_uuid: Option<String>,
    #[serde(default)]
    pub additional_detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRes {
    pub uuid: String,
    pub patient_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_non_coded: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onset_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_condition_uuid: Option<String>,
    pub voided: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionHistoryRes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_non_coded: Option<String>,
    pub conditions: Vec<ConditionRes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoidReq {
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConceptRes {
    pub uuid: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRes {
    pub uuid: String,
    pub patient_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coded_answer_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_text_answer: Option<String>,
    pub certainty: String,
    pub rank: u8,
    /// Uuid of the obs group the diagnosis is (or was) encoded in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_obs_uuid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MigrationRes {
    pub migrated: usize,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdtReq {
    pub patient_uuid: String,
    pub location_uuid: String,
    pub provider_uuid: String,
    /// RFC 3339; defaults to now.
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub bed_uuid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdtRes {
    pub encounter_uuid: String,
    pub visit_uuid: String,
    pub encounter_type_uuid: String,
    pub encounter_datetime: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRes {
    pub uuid: String,
    /// `drug` or `test`.
    pub kind: String,
    pub concept_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drug_uuid: Option<String>,
    pub action: String,
    pub urgency: String,
    pub date_activated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_expire_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_group_uuid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_request_uses_camel_case() {
        let req: ConditionReq = serde_json::from_str(
            r#"{"patientUuid": "p", "conditionNonCoded": "Odd rash", "status": "ACTIVE"}"#,
        )
        .unwrap();
        assert_eq!(req.patient_uuid, "p");
        assert_eq!(req.condition_non_coded.as_deref(), Some("Odd rash"));
        assert!(req.concept_uuid.is_none());
    }

    #[test]
    fn absent_optionals_are_not_rendered() {
        let res = OrderRes {
            uuid: "o".into(),
            kind: "test".into(),
            concept_uuid: "c".into(),
            drug_uuid: None,
            action: "NEW".into(),
            urgency: "ROUTINE".into(),
            date_activated: "2024-03-01T09:30:00Z".into(),
            auto_expire_date: None,
            order_group_uuid: None,
        };
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"dateActivated\""));
        assert!(!json.contains("drugUuid"));
    }
}
