//! Order wire models carried by an encounter transaction.

use crate::codes::{CareSetting, OrderAction};
use crate::transaction::ConceptRef;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

/// Fields shared by drug and test orders.
///
/// Flattened into [`DrugOrder`] and [`TestOrder`] on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHeader {
    /// Filled in by the server on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EmrUuid>,
    #[serde(default)]
    pub action: OrderAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_order_uuid: Option<EmrUuid>,
    #[serde(default)]
    pub care_setting: CareSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_activated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_expire_date: Option<DateTime<Utc>>,
    /// Response only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_stopped: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_to_fulfiller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_reason_concept: Option<ConceptRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_reason_text: Option<String>,
    /// Defaults to the first provider on the encounter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderer_uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_group: Option<OrderGroupRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_weight: Option<f64>,
}

/// Membership of an order in an order group created from an order set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderGroupRef {
    /// Filled in by the server on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EmrUuid>,
    /// Required on save; absent on read when the stored group has no order set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_set_uuid: Option<EmrUuid>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EmrUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
}

/// Dosing instructions of a drug order.
///
/// Unit, route and frequency fields are concept names (or uuids) resolved by the core crate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosingInstructions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose_units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default)]
    pub as_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_needed_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administration_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_refills: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrugOrder {
    #[serde(flatten)]
    pub header: OrderHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug: Option<DrugRef>,
    /// Taken from the drug when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<ConceptRef>,
    #[serde(default)]
    pub dosing_instructions: DosingInstructions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosing_instruction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_units: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOrder {
    #[serde(flatten)]
    pub header: OrderHeader,
    pub concept: ConceptRef,
}
