use super::condition::CodedOrFreeText;
use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use emr_uuid::EmrUuid;
use encounter_transaction::{Certainty, DiagnosisOrder};
use serde::{Deserialize, Serialize};

/// A first-class diagnosis record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    #[serde(default)]
    pub encounter: Option<EmrUuid>,
    pub diagnosis: CodedOrFreeText,
    pub certainty: Certainty,
    /// 1 for primary, 2 for secondary.
    pub rank: u8,
    #[serde(default)]
    pub condition: Option<EmrUuid>,
    #[serde(default)]
    pub form_namespace: Option<String>,
    #[serde(default)]
    pub form_field_path: Option<String>,
    /// The obs group this record was migrated from.
    #[serde(default)]
    pub source_obs: Option<EmrUuid>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Diagnosis {
    pub fn order(&self) -> DiagnosisOrder {
        DiagnosisOrder::from_rank(self.rank)
    }

    pub fn is_primary(&self) -> bool {
        self.order() == DiagnosisOrder::Primary
    }
}

impl_entity!(Diagnosis, "diagnoses", "diagnosis");
