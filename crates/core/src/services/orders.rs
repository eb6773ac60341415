//! Drug and test orders.
//!
//! [`OrderMapper`] turns wire orders into stored [`Order`] rows, resolving every reference
//! against the dictionary. [`OrderService`] saves them, stops the orders they revise or
//! discontinue, and groups orders placed from the same order set under one [`OrderGroup`].

use super::observations::{concept_ref, resolve_concept_ref};
use crate::audit::{AuditInfo, Auditor};
use crate::error::{EmrError, EmrResult};
use crate::model::{Concept, Drug, DrugDetails, Encounter, Order, OrderGroup, OrderKind};
use crate::store::{EmrStore, Records};
use chrono::{DateTime, Duration, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{
    DosingInstructions, DrugOrder, DrugRef, OrderAction, OrderGroupRef, OrderHeader, TestOrder,
    Urgency,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Drug,
    Test,
}

/// Maps wire orders onto stored orders.
pub struct OrderMapper<'r> {
    records: &'r Records,
}

impl<'r> OrderMapper<'r> {
    pub fn new(records: &'r Records) -> Self {
        Self { records }
    }

    /// # Errors
    ///
    /// - [`EmrError::InvalidDrug`] if the drug cannot be resolved or is retired.
    /// - [`EmrError::InvalidOrderFrequency`] if the frequency cannot be resolved.
    /// - [`EmrError::InvalidConcept`] if a unit, route or concept cannot be resolved.
    /// - [`EmrError::UnknownProvider`] if there is no resolvable orderer.
    /// - [`EmrError::InvalidUrgency`] for an unknown urgency.
    pub fn map_drug_order(
        &self,
        dto: &DrugOrder,
        encounter: &Encounter,
        previous: Option<&Order>,
        auditor: &Auditor,
        now: DateTime<Utc>,
    ) -> EmrResult<Order> {
        let inherited = previous
            .filter(|_| dto.drug.is_none() && dto.header.action == OrderAction::Discontinue)
            .and_then(|p| p.drug_details().map(|d| (p.concept, d.clone())));

        let (concept, details) = match inherited {
            Some(found) => found,
            None => {
                let drug = self.drug(dto.drug.as_ref())?;
                let concept = match &dto.concept {
                    Some(reference) => resolve_concept_ref(self.records, reference)?.uuid,
                    None => drug.concept,
                };
                let dosing = &dto.dosing_instructions;
                let details = DrugDetails {
                    drug: drug.uuid,
                    dose: dosing.dose,
                    dose_units: self.concept(dosing.dose_units.as_deref())?,
                    route: self.concept(dosing.route.as_deref())?,
                    frequency: self.frequency(dosing.frequency.as_deref())?,
                    as_needed: dosing.as_needed,
                    as_needed_condition: dosing.as_needed_condition.clone(),
                    administration_instructions: dosing.administration_instructions.clone(),
                    quantity: dosing.quantity,
                    quantity_units: self.concept(dosing.quantity_units.as_deref())?,
                    number_of_refills: dosing.number_of_refills,
                    duration: dto.duration,
                    duration_units: self.concept(dto.duration_units.as_deref())?,
                    dosing_instruction_type: dto.dosing_instruction_type.clone(),
                };
                (concept, details)
            }
        };

        let mut order = self.map_header(
            &dto.header,
            OrderKind::Drug(details.clone()),
            concept,
            encounter,
            auditor,
            now,
        )?;
        if order.auto_expire_date.is_none() && order.action != OrderAction::Discontinue {
            let start = order.scheduled_date.unwrap_or(order.date_activated);
            let units = details
                .duration_units
                .and_then(|uuid| self.records.concepts.get(&uuid));
            order.auto_expire_date = auto_expire_date(start, details.duration, units)?;
        }
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns [`EmrError::InvalidConcept`] if the test concept cannot be resolved, and the
    /// header errors of [`OrderMapper::map_drug_order`].
    pub fn map_test_order(
        &self,
        dto: &TestOrder,
        encounter: &Encounter,
        auditor: &Auditor,
        now: DateTime<Utc>,
    ) -> EmrResult<Order> {
        let concept = resolve_concept_ref(self.records, &dto.concept)?.uuid;
        self.map_header(&dto.header, OrderKind::Test, concept, encounter, auditor, now)
    }

    fn map_header(
        &self,
        header: &OrderHeader,
        kind: OrderKind,
        concept: EmrUuid,
        encounter: &Encounter,
        auditor: &Auditor,
        now: DateTime<Utc>,
    ) -> EmrResult<Order> {
        let orderer = header
            .orderer_uuid
            .or_else(|| encounter.first_provider())
            .ok_or_else(|| EmrError::UnknownProvider("order has no orderer".into()))?;
        if !self.records.providers.contains(&orderer) {
            return Err(EmrError::UnknownProvider(orderer.to_string()));
        }

        let mut urgency = match header.urgency.as_deref() {
            Some(value) => value.parse::<Urgency>()?,
            None => Urgency::default(),
        };
        if header.scheduled_date.is_some() {
            urgency = Urgency::OnScheduledDate;
        } else if urgency == Urgency::OnScheduledDate {
            return Err(EmrError::Validation(
                "ON_SCHEDULED_DATE orders require a scheduled date".into(),
            ));
        }

        let order_reason_concept = header
            .order_reason_concept
            .as_ref()
            .map(|reference| resolve_concept_ref(self.records, reference).map(|c| c.uuid))
            .transpose()?;

        Ok(Order {
            uuid: header.uuid.unwrap_or_default(),
            kind,
            patient: encounter.patient,
            encounter: encounter.uuid,
            concept,
            orderer,
            care_setting: header.care_setting,
            action: header.action,
            previous_order: header.previous_order_uuid,
            urgency,
            scheduled_date: header.scheduled_date,
            date_activated: header.date_activated.unwrap_or(now),
            auto_expire_date: header.auto_expire_date,
            date_stopped: None,
            comment_to_fulfiller: header.comment_to_fulfiller.clone(),
            order_reason_concept,
            order_reason_text: header.order_reason_text.clone(),
            order_group: None,
            sort_weight: header.sort_weight,
            voided: None,
            audit: AuditInfo::created(auditor, now),
        })
    }

    fn drug(&self, reference: Option<&DrugRef>) -> EmrResult<&'r Drug> {
        let reference =
            reference.ok_or_else(|| EmrError::InvalidDrug("drug order has no drug".into()))?;
        let drug = match (reference.uuid, reference.name.as_deref()) {
            (Some(uuid), _) => self
                .records
                .drugs
                .get(&uuid)
                .ok_or_else(|| EmrError::InvalidDrug(uuid.to_string()))?,
            (None, Some(name)) => self
                .records
                .drugs
                .values()
                .find(|d| d.name.as_str().eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| EmrError::InvalidDrug(name.to_string()))?,
            (None, None) => {
                return Err(EmrError::InvalidDrug("drug reference is empty".into()));
            }
        };
        if drug.retired {
            return Err(EmrError::InvalidDrug(format!("{} is retired", drug.name)));
        }
        Ok(drug)
    }

    fn concept(&self, reference: Option<&str>) -> EmrResult<Option<EmrUuid>> {
        reference
            .map(|r| {
                self.records
                    .resolve_concept(r)
                    .map(|c| c.uuid)
                    .ok_or_else(|| EmrError::InvalidConcept(r.to_string()))
            })
            .transpose()
    }

    fn frequency(&self, reference: Option<&str>) -> EmrResult<Option<EmrUuid>> {
        let Some(reference) = reference else {
            return Ok(None);
        };
        let frequencies = &self.records.order_frequencies;
        let found = match EmrUuid::parse(reference) {
            Ok(uuid) => frequencies.get(&uuid),
            Err(_) => frequencies.values().find(|f| {
                self.records
                    .concepts
                    .get(&f.concept)
                    .is_some_and(|c| c.is_named(reference))
            }),
        };
        found
            .map(|f| Some(f.uuid))
            .ok_or_else(|| EmrError::InvalidOrderFrequency(reference.to_string()))
    }
}

/// `start + duration - 1s` for time-based duration units; `None` otherwise.
///
/// # Errors
///
/// Returns [`EmrError::Validation`] if the expiry falls outside the representable date range.
fn auto_expire_date(
    start: DateTime<Utc>,
    duration: Option<u32>,
    units: Option<&Concept>,
) -> EmrResult<Option<DateTime<Utc>>> {
    let (Some(duration), Some(units)) = (duration, units) else {
        return Ok(None);
    };
    let amount = i64::from(duration);
    let unit = units.name.as_str().trim().to_ascii_lowercase();
    let span = match unit.trim_end_matches('s') {
        "minute" => Duration::try_minutes(amount),
        "hour" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        _ => return Ok(None),
    };
    span.and_then(|span| start.checked_add_signed(span))
        .and_then(|end| end.checked_sub_signed(Duration::seconds(1)))
        .map(Some)
        .ok_or_else(|| {
            EmrError::Validation(format!("duration of {duration} {} is too long", units.name))
        })
}

/// The stored order a revise/discontinue/renew points at.
fn previous_order(
    records: &Records,
    header: &OrderHeader,
    encounter: &Encounter,
) -> EmrResult<Option<Order>> {
    if header.action == OrderAction::New {
        return Ok(None);
    }
    let uuid = header.previous_order_uuid.ok_or_else(|| {
        EmrError::Validation(format!(
            "{:?} orders require a previous order",
            header.action
        ))
    })?;
    let previous = records.orders.require(&uuid)?;
    if previous.patient != encounter.patient {
        return Err(EmrError::InvalidArgument(format!(
            "previous order {uuid} belongs to another patient"
        )));
    }
    Ok(Some(previous.clone()))
}

/// Stops `previous` one second before `order` starts.
fn supersede(
    records: &mut Records,
    previous: &Order,
    order: &Order,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<()> {
    if previous.concept != order.concept {
        return Err(EmrError::InvalidArgument(format!(
            "previous order {} is for a different concept",
            previous.uuid
        )));
    }
    if !previous.is_active_at(order.date_activated) {
        return Err(EmrError::InvalidState(format!(
            "previous order {} is not active",
            previous.uuid
        )));
    }
    let stored = records.orders.require_mut(&previous.uuid)?;
    stored.date_stopped = Some(order.date_activated - Duration::seconds(1));
    stored.audit.touch(auditor, now);
    Ok(())
}

/// Saves wire orders of one encounter inside an open transaction.
///
/// Orders whose uuid is already stored are left untouched. Returns the uuids of every order in
/// the submission.
pub(crate) fn save_orders_in(
    records: &mut Records,
    encounter: EmrUuid,
    drug_orders: &[DrugOrder],
    test_orders: &[TestOrder],
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<Vec<EmrUuid>> {
    let encounter = records.encounters.require(&encounter)?.clone();
    let mut saved = Vec::new();
    let mut pending: Vec<(Order, Option<OrderGroupRef>)> = Vec::new();

    for dto in drug_orders {
        if let Some(uuid) = dto.header.uuid.filter(|u| records.orders.contains(u)) {
            saved.push(uuid);
            continue;
        }
        let previous = previous_order(records, &dto.header, &encounter)?;
        let order = OrderMapper::new(records).map_drug_order(
            dto,
            &encounter,
            previous.as_ref(),
            auditor,
            now,
        )?;
        if let Some(previous) = &previous {
            supersede(records, previous, &order, auditor, now)?;
        }
        pending.push((order, dto.header.order_group.clone()));
    }
    for dto in test_orders {
        if let Some(uuid) = dto.header.uuid.filter(|u| records.orders.contains(u)) {
            saved.push(uuid);
            continue;
        }
        let previous = previous_order(records, &dto.header, &encounter)?;
        let order = OrderMapper::new(records).map_test_order(dto, &encounter, auditor, now)?;
        if let Some(previous) = &previous {
            supersede(records, previous, &order, auditor, now)?;
        }
        pending.push((order, dto.header.order_group.clone()));
    }

    let mut by_set: BTreeMap<EmrUuid, Vec<usize>> = BTreeMap::new();
    for (index, (_, group)) in pending.iter().enumerate() {
        if let Some(group) = group {
            let set_uuid = group.order_set_uuid.ok_or_else(|| {
                EmrError::Validation("order group requires an order set".into())
            })?;
            by_set.entry(set_uuid).or_default().push(index);
        }
    }
    for (set_uuid, indexes) in by_set {
        let order_set = records.order_sets.require(&set_uuid)?.clone();
        let hinted = indexes
            .iter()
            .find_map(|i| pending[*i].1.as_ref().and_then(|g| g.uuid));
        let mut group = match hinted.and_then(|uuid| records.order_groups.get(&uuid)) {
            Some(existing) => {
                if existing.patient != encounter.patient {
                    return Err(EmrError::InvalidArgument(format!(
                        "order group {} belongs to another patient",
                        existing.uuid
                    )));
                }
                if existing.order_set != Some(set_uuid) {
                    return Err(EmrError::InvalidArgument(format!(
                        "order group {} is not for order set {set_uuid}",
                        existing.uuid
                    )));
                }
                existing.clone()
            }
            None => OrderGroup {
                uuid: hinted.unwrap_or_default(),
                patient: encounter.patient,
                encounter: encounter.uuid,
                order_set: Some(set_uuid),
                orders: Vec::new(),
                audit: AuditInfo::created(auditor, now),
            },
        };

        let mut members: Vec<(Option<f64>, EmrUuid)> = Vec::new();
        for index in indexes {
            let order = &mut pending[index].0;
            let drug = order.drug_details().map(|d| d.drug);
            let weight = order
                .sort_weight
                .or_else(|| order_set.weight_for(order.concept, drug));
            order.sort_weight = weight;
            order.order_group = Some(group.uuid);
            members.push((weight, order.uuid));
        }
        members.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        group
            .orders
            .extend(members.into_iter().map(|(_, uuid)| uuid));
        tracing::info!(order_group = %group.uuid, order_set = %set_uuid, "grouped orders");
        records.order_groups.insert(group);
    }

    for (order, _) in pending {
        tracing::info!(order = %order.uuid, action = ?order.action, "saved order");
        saved.push(order.uuid);
        records.orders.insert(order);
    }
    Ok(saved)
}

fn concept_name(records: &Records, uuid: Option<EmrUuid>) -> Option<String> {
    uuid.map(|uuid| match records.concepts.get(&uuid) {
        Some(concept) => concept.name.to_string(),
        None => uuid.to_string(),
    })
}

fn header_to_wire(records: &Records, order: &Order) -> OrderHeader {
    let order_group = order.order_group.map(|uuid| OrderGroupRef {
        uuid: Some(uuid),
        order_set_uuid: records.order_groups.get(&uuid).and_then(|g| g.order_set),
    });
    OrderHeader {
        uuid: Some(order.uuid),
        action: order.action,
        previous_order_uuid: order.previous_order,
        care_setting: order.care_setting,
        date_activated: Some(order.date_activated),
        scheduled_date: order.scheduled_date,
        auto_expire_date: order.auto_expire_date,
        date_stopped: order.date_stopped,
        urgency: Some(order.urgency.as_str().to_string()),
        comment_to_fulfiller: order.comment_to_fulfiller.clone(),
        order_reason_concept: order.order_reason_concept.map(|c| concept_ref(records, c)),
        order_reason_text: order.order_reason_text.clone(),
        orderer_uuid: Some(order.orderer),
        order_group,
        sort_weight: order.sort_weight,
    }
}

pub(crate) fn drug_order_to_wire(records: &Records, order: &Order) -> Option<DrugOrder> {
    let details = order.drug_details()?;
    let drug = records.drugs.get(&details.drug);
    let frequency = details.frequency.and_then(|uuid| {
        records
            .order_frequencies
            .get(&uuid)
            .and_then(|f| concept_name(records, Some(f.concept)))
    });
    Some(DrugOrder {
        header: header_to_wire(records, order),
        drug: Some(DrugRef {
            uuid: Some(details.drug),
            name: drug.map(|d| d.name.to_string()),
            form: drug.and_then(|d| concept_name(records, d.dosage_form)),
        }),
        concept: Some(concept_ref(records, order.concept)),
        dosing_instructions: DosingInstructions {
            dose: details.dose,
            dose_units: concept_name(records, details.dose_units),
            route: concept_name(records, details.route),
            frequency,
            as_needed: details.as_needed,
            as_needed_condition: details.as_needed_condition.clone(),
            administration_instructions: details.administration_instructions.clone(),
            quantity: details.quantity,
            quantity_units: concept_name(records, details.quantity_units),
            number_of_refills: details.number_of_refills,
        },
        dosing_instruction_type: details.dosing_instruction_type.clone(),
        duration: details.duration,
        duration_units: concept_name(records, details.duration_units),
    })
}

pub(crate) fn test_order_to_wire(records: &Records, order: &Order) -> Option<TestOrder> {
    match order.kind {
        OrderKind::Test => Some(TestOrder {
            header: header_to_wire(records, order),
            concept: concept_ref(records, order.concept),
        }),
        OrderKind::Drug(_) => None,
    }
}

pub struct OrderService<S> {
    store: Arc<S>,
}

impl<S: EmrStore> OrderService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Saves drug and test orders against an existing encounter, in one transaction.
    pub fn save_orders(
        &self,
        encounter: EmrUuid,
        drug_orders: &[DrugOrder],
        test_orders: &[TestOrder],
        auditor: &Auditor,
    ) -> EmrResult<Vec<Order>> {
        let now = Utc::now();
        self.store.transaction(|records| {
            let saved = save_orders_in(records, encounter, drug_orders, test_orders, auditor, now)?;
            saved
                .iter()
                .map(|uuid| records.orders.require(uuid).cloned())
                .collect()
        })
    }

    /// Orders of a patient that are live now, oldest first.
    pub fn active_orders(
        &self,
        patient: EmrUuid,
        order_type: Option<OrderType>,
    ) -> EmrResult<Vec<Order>> {
        let now = Utc::now();
        self.store.read(|records| {
            records.patients.require(&patient)?;
            let mut active: Vec<Order> = records
                .orders
                .values()
                .filter(|o| o.patient == patient && o.is_active_at(now))
                .filter(|o| match order_type {
                    Some(OrderType::Drug) => o.is_drug_order(),
                    Some(OrderType::Test) => !o.is_drug_order(),
                    None => true,
                })
                .cloned()
                .collect();
            active.sort_by_key(|o| o.date_activated);
            Ok(active)
        })
    }

    pub fn order_group(&self, uuid: EmrUuid) -> EmrResult<OrderGroup> {
        self.store
            .read(|records| records.order_groups.require(&uuid).cloned())
    }
}
