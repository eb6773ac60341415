use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{Certainty, ConditionStatus};
use serde::{Deserialize, Serialize};

/// A coded answer or a free-text one. Exactly one side is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedOrFreeText {
    #[serde(default)]
    pub coded: Option<EmrUuid>,
    #[serde(default)]
    pub non_coded: Option<NonEmptyText>,
}

impl CodedOrFreeText {
    pub fn coded(concept: EmrUuid) -> Self {
        Self {
            coded: Some(concept),
            non_coded: None,
        }
    }

    pub fn free_text(text: NonEmptyText) -> Self {
        Self {
            coded: None,
            non_coded: Some(text),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.coded.is_some() != self.non_coded.is_some()
    }
}

/// One clinically asserted condition.
///
/// Rows are never edited in place once their status changes: a revision is a new row whose
/// `previous_condition` points at the row it supersedes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    /// The coded concept, or the configured non-coded sentinel when `condition_non_coded` is set.
    pub concept: EmrUuid,
    #[serde(default)]
    pub condition_non_coded: Option<String>,
    pub status: ConditionStatus,
    #[serde(default)]
    pub verification: Option<Certainty>,
    #[serde(default)]
    pub onset_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_reason: Option<EmrUuid>,
    #[serde(default)]
    pub additional_detail: Option<String>,
    #[serde(default)]
    pub previous_condition: Option<EmrUuid>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Condition {
    pub fn is_voided(&self) -> bool {
        self.voided.is_some()
    }

    /// Key that groups revisions of the same clinical condition: the concept, or the
    /// lower-cased free text for non-coded conditions.
    pub fn history_key(&self) -> String {
        match &self.condition_non_coded {
            Some(text) => text.trim().to_lowercase(),
            None => self.concept.to_string(),
        }
    }

    /// True when `other` asserts exactly what this row asserts. Identity and audit fields are
    /// ignored.
    pub fn same_clinical_content(&self, other: &Condition) -> bool {
        self.patient == other.patient
            && self.concept == other.concept
            && self.condition_non_coded == other.condition_non_coded
            && self.status == other.status
            && self.verification == other.verification
            && self.onset_date == other.onset_date
            && self.end_date == other.end_date
            && self.end_reason == other.end_reason
            && self.additional_detail == other.additional_detail
            && self.voided.is_some() == other.voided.is_some()
    }
}

impl_entity!(Condition, "conditions", "condition");
