use super::impl_entity;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    #[default]
    Available,
    Occupied,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bed {
    pub uuid: EmrUuid,
    pub bed_number: String,
    pub ward: EmrUuid,
    #[serde(default)]
    pub status: BedStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedAssignment {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    pub encounter: EmrUuid,
    pub bed: EmrUuid,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl BedAssignment {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

impl_entity!(Bed, "beds", "bed");
impl_entity!(BedAssignment, "bed_assignments", "bed assignment");
