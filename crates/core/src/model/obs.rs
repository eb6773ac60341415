use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObsValue {
    Coded(EmrUuid),
    Numeric(f64),
    Text(String),
    Boolean(bool),
    Datetime(DateTime<Utc>),
}

impl ObsValue {
    pub fn as_coded(&self) -> Option<EmrUuid> {
        match self {
            ObsValue::Coded(uuid) => Some(*uuid),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ObsValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A single observation, or an obs group when it has members and no value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obs {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    #[serde(default)]
    pub encounter: Option<EmrUuid>,
    pub concept: EmrUuid,
    #[serde(default)]
    pub value: Option<ObsValue>,
    pub obs_datetime: DateTime<Utc>,
    /// Parent group, if this obs is a group member.
    #[serde(default)]
    pub group: Option<EmrUuid>,
    #[serde(default)]
    pub members: Vec<EmrUuid>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub form_namespace: Option<String>,
    #[serde(default)]
    pub form_field_path: Option<String>,
    #[serde(default)]
    pub order: Option<EmrUuid>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Obs {
    pub fn is_voided(&self) -> bool {
        self.voided.is_some()
    }
}

impl_entity!(Obs, "obs", "observation");
