//! Translation between REST bodies and core types.
//!
//! Request fields arrive as strings; anything that does not parse is a `400 Bad Request` that
//! names the offending field.

use crate::error::ApiError;
use api_shared::{
    AdtReq, AdtRes, ConceptRes, ConditionHistoryRes, ConditionReq, ConditionRes, DiagnosisRes,
    OrderRes,
};
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use emr_core::model::{Concept, Condition, Diagnosis, Encounter, Order, OrderKind};
use emr_core::{AdtRequest, Auditor, ConditionHistory, ConditionInput, EmrUuid};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const USER_UUID_HEADER: &str = "x-user-uuid";
pub const USERNAME_HEADER: &str = "x-username";

pub fn uuid(field: &str, value: &str) -> Result<EmrUuid, ApiError> {
    EmrUuid::parse(value.trim())
        .map_err(|_| ApiError::BadRequest(format!("{field} is not a canonical UUID: {value}")))
}

pub fn optional_uuid(field: &str, value: Option<&str>) -> Result<Option<EmrUuid>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| uuid(field, v))
        .transpose()
}

/// Accepts RFC 3339 datetimes and plain `YYYY-MM-DD` dates (read as midnight UTC).
pub fn datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is not a date: {value}")))
}

pub fn optional_datetime(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| datetime(field, v))
        .transpose()
}

/// Reads an upper-case wire code (`ACTIVE`, `CONFIRMED`, ...) through the enum's serde spelling.
pub fn code<T: DeserializeOwned>(field: &str, value: &str) -> Result<T, ApiError> {
    let normalised = value.trim().to_ascii_uppercase();
    serde_json::from_value(serde_json::Value::String(normalised))
        .map_err(|_| ApiError::BadRequest(format!("{field} has an unknown code: {value}")))
}

pub fn code_str<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The caller named by the `x-user-uuid` and `x-username` headers, or the system user when
/// neither is sent.
pub fn auditor(headers: &HeaderMap) -> Result<Auditor, ApiError> {
    let header = |name: &str| -> Result<Option<String>, ApiError> {
        headers
            .get(name)
            .map(|v| {
                v.to_str()
                    .map(str::to_string)
                    .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text")))
            })
            .transpose()
    };
    match (header(USER_UUID_HEADER)?, header(USERNAME_HEADER)?) {
        (None, None) => Ok(Auditor::system()),
        (Some(id), Some(name)) => Ok(Auditor::new(uuid(USER_UUID_HEADER, &id)?, name)?),
        _ => Err(ApiError::BadRequest(format!(
            "{USER_UUID_HEADER} and {USERNAME_HEADER} must be sent together"
        ))),
    }
}

pub fn condition_input(req: ConditionReq) -> Result<ConditionInput, ApiError> {
    Ok(ConditionInput {
        uuid: optional_uuid("uuid", req.uuid.as_deref())?,
        patient: uuid("patientUuid", &req.patient_uuid)?,
        concept: optional_uuid("conceptUuid", req.concept_uuid.as_deref())?,
        condition_non_coded: req.condition_non_coded,
        status: code("status", &req.status)?,
        verification: req
            .verification
            .as_deref()
            .map(|v| code("verification", v))
            .transpose()?,
        onset_date: optional_datetime("onsetDate", req.onset_date.as_deref())?,
        end_date: optional_datetime("endDate", req.end_date.as_deref())?,
        end_reason: optional_uuid("endReasonUuid", req.end_reason_uuid.as_deref())?,
        additional_detail: req.additional_detail,
    })
}

pub fn condition_res(condition: &Condition) -> ConditionRes {
    ConditionRes {
        uuid: condition.uuid.to_string(),
        patient_uuid: condition.patient.to_string(),
        concept_uuid: Some(condition.concept.to_string()),
        condition_non_coded: condition.condition_non_coded.clone(),
        status: code_str(&condition.status),
        verification: condition.verification.as_ref().map(code_str),
        onset_date: condition.onset_date.map(timestamp),
        end_date: condition.end_date.map(timestamp),
        end_reason_uuid: condition.end_reason.map(|u| u.to_string()),
        additional_detail: condition.additional_detail.clone(),
        previous_condition_uuid: condition.previous_condition.map(|u| u.to_string()),
        voided: condition.is_voided(),
        void_reason: condition
            .voided
            .as_ref()
            .map(|v| v.reason.as_str().to_string()),
    }
}

pub fn condition_history_res(history: &ConditionHistory) -> ConditionHistoryRes {
    ConditionHistoryRes {
        concept_uuid: Some(history.concept.to_string()),
        condition_non_coded: history.condition_non_coded.clone(),
        conditions: history.conditions.iter().map(condition_res).collect(),
    }
}

pub fn concept_res(concept: &Concept) -> ConceptRes {
    ConceptRes {
        uuid: concept.uuid.to_string(),
        name: concept.name.to_string(),
    }
}

pub fn diagnosis_res(diagnosis: &Diagnosis) -> DiagnosisRes {
    DiagnosisRes {
        uuid: diagnosis.uuid.to_string(),
        patient_uuid: diagnosis.patient.to_string(),
        encounter_uuid: diagnosis.encounter.map(|u| u.to_string()),
        coded_answer_uuid: diagnosis.diagnosis.coded.map(|u| u.to_string()),
        free_text_answer: diagnosis
            .diagnosis
            .non_coded
            .as_ref()
            .map(|t| t.as_str().to_string()),
        certainty: code_str(&diagnosis.certainty),
        rank: diagnosis.rank,
        source_obs_uuid: diagnosis.source_obs.map(|u| u.to_string()),
    }
}

pub fn adt_request(req: AdtReq) -> Result<AdtRequest, ApiError> {
    Ok(AdtRequest {
        patient: uuid("patientUuid", &req.patient_uuid)?,
        location: uuid("locationUuid", &req.location_uuid)?,
        datetime: optional_datetime("datetime", req.datetime.as_deref())?,
        provider: uuid("providerUuid", &req.provider_uuid)?,
        bed: optional_uuid("bedUuid", req.bed_uuid.as_deref())?,
    })
}

pub fn adt_res(encounter: &Encounter) -> AdtRes {
    AdtRes {
        encounter_uuid: encounter.uuid.to_string(),
        visit_uuid: encounter.visit.map(|u| u.to_string()).unwrap_or_default(),
        encounter_type_uuid: encounter.encounter_type.to_string(),
        encounter_datetime: timestamp(encounter.encounter_datetime),
    }
}

pub fn order_res(order: &Order) -> OrderRes {
    let (kind, drug_uuid) = match &order.kind {
        OrderKind::Drug(details) => ("drug", Some(details.drug.to_string())),
        OrderKind::Test => ("test", None),
    };
    OrderRes {
        uuid: order.uuid.to_string(),
        kind: kind.to_string(),
        concept_uuid: order.concept.to_string(),
        drug_uuid,
        action: code_str(&order.action),
        urgency: order.urgency.as_str().to_string(),
        date_activated: timestamp(order.date_activated),
        auto_expire_date: order.auto_expire_date.map(timestamp),
        order_group_uuid: order.order_group.map(|u| u.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use emr_core::encounter_transaction::{Certainty, ConditionStatus};

    #[test]
    fn dates_accept_plain_days_and_rfc3339() {
        let day = datetime("onsetDate", "2024-03-01").unwrap();
        assert_eq!(timestamp(day), "2024-03-01T00:00:00Z");
        let at = datetime("onsetDate", "2024-03-01T09:30:00+01:00").unwrap();
        assert_eq!(timestamp(at), "2024-03-01T08:30:00Z");
        assert!(datetime("onsetDate", "March 1st").is_err());
    }

    #[test]
    fn codes_read_case_insensitively() {
        let status: ConditionStatus = code("status", "history_of").unwrap();
        assert_eq!(status, ConditionStatus::HistoryOf);
        assert_eq!(code_str(&Certainty::Presumed), "PRESUMED");
        assert!(code::<ConditionStatus>("status", "GONE").is_err());
    }

    #[test]
    fn auditor_headers_travel_together() {
        let mut headers = HeaderMap::new();
        assert_eq!(auditor(&headers).unwrap(), Auditor::system());

        headers.insert(USERNAME_HEADER, HeaderValue::from_static("nurse.ama"));
        assert!(matches!(auditor(&headers), Err(ApiError::BadRequest(_))));

        headers.insert(
            USER_UUID_HEADER,
            HeaderValue::from_static("3f2c1d7a-4b8e-4c55-9d10-2a6b7c8d9e0f"),
        );
        let nurse = auditor(&headers).unwrap();
        assert_eq!(nurse.username.as_str(), "nurse.ama");
    }

    #[test]
    fn blank_optional_uuids_are_absent() {
        assert_eq!(optional_uuid("conceptUuid", Some("  ")).unwrap(), None);
        assert!(optional_uuid("conceptUuid", Some("NOT-A-UUID")).is_err());
    }
}
