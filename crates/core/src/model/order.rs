use super::impl_entity;
use crate::audit::{AuditInfo, VoidInfo};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{CareSetting, OrderAction, Urgency};
use serde::{Deserialize, Serialize};

/// Drug-specific part of an order. Unit, route and frequency fields are concept uuids, except
/// `frequency`, which is an [`OrderFrequency`](super::OrderFrequency) uuid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DrugDetails {
    pub drug: EmrUuid,
    #[serde(default)]
    pub dose: Option<f64>,
    #[serde(default)]
    pub dose_units: Option<EmrUuid>,
    #[serde(default)]
    pub route: Option<EmrUuid>,
    #[serde(default)]
    pub frequency: Option<EmrUuid>,
    #[serde(default)]
    pub as_needed: bool,
    #[serde(default)]
    pub as_needed_condition: Option<String>,
    #[serde(default)]
    pub administration_instructions: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub quantity_units: Option<EmrUuid>,
    #[serde(default)]
    pub number_of_refills: Option<u32>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub duration_units: Option<EmrUuid>,
    #[serde(default)]
    pub dosing_instruction_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderKind {
    Drug(DrugDetails),
    Test,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub uuid: EmrUuid,
    pub kind: OrderKind,
    pub patient: EmrUuid,
    pub encounter: EmrUuid,
    pub concept: EmrUuid,
    pub orderer: EmrUuid,
    #[serde(default)]
    pub care_setting: CareSetting,
    #[serde(default)]
    pub action: OrderAction,
    #[serde(default)]
    pub previous_order: Option<EmrUuid>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub scheduled_date: Option<DateTime<Utc>>,
    pub date_activated: DateTime<Utc>,
    #[serde(default)]
    pub auto_expire_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_stopped: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment_to_fulfiller: Option<String>,
    #[serde(default)]
    pub order_reason_concept: Option<EmrUuid>,
    #[serde(default)]
    pub order_reason_text: Option<String>,
    #[serde(default)]
    pub order_group: Option<EmrUuid>,
    #[serde(default)]
    pub sort_weight: Option<f64>,
    #[serde(default)]
    pub voided: Option<VoidInfo>,
    pub audit: AuditInfo,
}

impl Order {
    pub fn is_drug_order(&self) -> bool {
        matches!(self.kind, OrderKind::Drug(_))
    }

    pub fn drug_details(&self) -> Option<&DrugDetails> {
        match &self.kind {
            OrderKind::Drug(details) => Some(details),
            OrderKind::Test => None,
        }
    }

    /// Active orders are live instructions: not voided, not a discontinuation, already
    /// activated, and neither stopped nor expired at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        if self.voided.is_some() || self.action == OrderAction::Discontinue {
            return false;
        }
        if self.date_activated > at {
            return false;
        }
        let stopped = self.date_stopped.is_some_and(|d| d <= at);
        let expired = self.auto_expire_date.is_some_and(|d| d <= at);
        !stopped && !expired
    }
}

/// Orders placed together from one order set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub uuid: EmrUuid,
    pub patient: EmrUuid,
    pub encounter: EmrUuid,
    #[serde(default)]
    pub order_set: Option<EmrUuid>,
    /// Member orders, in sort-weight order.
    #[serde(default)]
    pub orders: Vec<EmrUuid>,
    pub audit: AuditInfo,
}

impl_entity!(Order, "orders", "order");
impl_entity!(OrderGroup, "order_groups", "order group");
