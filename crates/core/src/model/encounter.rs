use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterProvider {
    pub provider: EmrUuid,
    #[serde(default)]
    pub role: Option<String>,
}

/// One clinical interaction. Observations and orders point back at it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    #[serde(default)]
    pub visit: Option<EmrUuid>,
    pub encounter_type: EmrUuid,
    #[serde(default)]
    pub location: Option<EmrUuid>,
    pub encounter_datetime: DateTime<Utc>,
    #[serde(default)]
    pub providers: Vec<EncounterProvider>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Encounter {
    pub fn first_provider(&self) -> Option<EmrUuid> {
        self.providers.first().map(|p| p.provider)
    }
}

impl_entity!(Encounter, "encounters", "encounter");
