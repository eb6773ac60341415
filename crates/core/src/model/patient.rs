use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub uuid: EmrUuid,
    pub identifier: NonEmptyText,
    pub given_name: NonEmptyText,
    pub family_name: NonEmptyText,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
}

/// A period of care, grouping the encounters that happen during it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    pub visit_type: EmrUuid,
    #[serde(default)]
    pub location: Option<EmrUuid>,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Visit {
    /// A visit is active at `at` when it has started, has not stopped, and is not voided.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.voided.is_none() && self.start <= at && self.stop.map_or(true, |stop| stop >= at)
    }
}

impl_entity!(Patient, "patients", "patient");
impl_entity!(Visit, "visits", "visit");
