//! Observation trees: wire conversion, upsert and cascading void.

use crate::audit::{void_reason, AuditInfo, Auditor, VoidInfo};
use crate::error::{EmrError, EmrResult};
use crate::model::{Concept, ConceptDatatype, Obs, ObsValue};
use crate::store::Records;
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{self as et, ConceptRef};

/// Who, where and when for obs written during one save.
pub(crate) struct ObsContext<'a> {
    pub patient: EmrUuid,
    pub encounter: Option<EmrUuid>,
    pub obs_datetime: DateTime<Utc>,
    pub auditor: &'a Auditor,
    pub now: DateTime<Utc>,
}

impl ObsContext<'_> {
    /// A new, unsaved obs row.
    pub fn new_obs(&self, concept: EmrUuid, value: Option<ObsValue>) -> Obs {
        Obs {
            uuid: EmrUuid::new(),
            patient: self.patient,
            encounter: self.encounter,
            concept,
            value,
            obs_datetime: self.obs_datetime,
            group: None,
            members: Vec::new(),
            comment: None,
            form_namespace: None,
            form_field_path: None,
            order: None,
            voided: None,
            audit: AuditInfo::created(self.auditor, self.now),
        }
    }
}

/// Fills a [`ConceptRef`] from the dictionary.
pub(crate) fn concept_ref(records: &Records, uuid: EmrUuid) -> ConceptRef {
    match records.concepts.get(&uuid) {
        Some(concept) => describe(concept),
        None => ConceptRef::by_uuid(uuid),
    }
}

fn describe(concept: &Concept) -> ConceptRef {
    ConceptRef {
        uuid: Some(concept.uuid),
        name: Some(concept.name.to_string()),
        data_type: Some(concept.datatype.as_str().to_string()),
        concept_class: Some(concept.concept_class.clone()),
        set: concept.is_set,
    }
}

/// Resolves a wire concept reference by uuid, falling back to name.
///
/// # Errors
///
/// Returns [`EmrError::InvalidConcept`] when nothing matches.
pub(crate) fn resolve_concept_ref<'r>(
    records: &'r Records,
    reference: &ConceptRef,
) -> EmrResult<&'r Concept> {
    if let Some(uuid) = reference.uuid {
        return records
            .concepts
            .get(&uuid)
            .ok_or_else(|| EmrError::InvalidConcept(uuid.to_string()));
    }
    let name = reference
        .name
        .as_deref()
        .ok_or_else(|| EmrError::InvalidConcept("concept reference is empty".into()))?;
    records
        .concept_by_name(name)
        .ok_or_else(|| EmrError::InvalidConcept(name.to_string()))
}

/// Converts a wire value into a stored value, as dictated by the concept's datatype.
pub(crate) fn value_from_wire(
    records: &Records,
    concept: &Concept,
    value: Option<&et::ObsValue>,
) -> EmrResult<Option<ObsValue>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let mismatch = || {
        EmrError::Validation(format!(
            "value {value:?} does not fit {} concept {}",
            concept.datatype.as_str(),
            concept.name
        ))
    };

    let converted = match (concept.datatype, value) {
        (ConceptDatatype::Coded, et::ObsValue::Concept(answer)) => {
            ObsValue::Coded(resolve_concept_ref(records, answer)?.uuid)
        }
        (ConceptDatatype::Coded, et::ObsValue::Text(reference)) => ObsValue::Coded(
            records
                .resolve_concept(reference)
                .ok_or_else(|| EmrError::InvalidConcept(reference.clone()))?
                .uuid,
        ),
        (ConceptDatatype::Numeric, et::ObsValue::Number(n)) => ObsValue::Numeric(*n),
        (ConceptDatatype::Numeric, et::ObsValue::Text(text)) => {
            ObsValue::Numeric(text.trim().parse().map_err(|_| mismatch())?)
        }
        (ConceptDatatype::Text, et::ObsValue::Text(text)) => ObsValue::Text(text.clone()),
        (ConceptDatatype::Text, et::ObsValue::Number(n)) => ObsValue::Text(n.to_string()),
        (ConceptDatatype::Boolean, et::ObsValue::Boolean(b)) => ObsValue::Boolean(*b),
        (ConceptDatatype::Boolean, et::ObsValue::Text(text)) => {
            ObsValue::Boolean(text.trim().parse().map_err(|_| mismatch())?)
        }
        (ConceptDatatype::Datetime, et::ObsValue::Text(text)) => ObsValue::Datetime(
            DateTime::parse_from_rfc3339(text.trim())
                .map_err(|_| mismatch())?
                .with_timezone(&Utc),
        ),
        _ => return Err(mismatch()),
    };
    Ok(Some(converted))
}

pub(crate) fn value_to_wire(records: &Records, value: &ObsValue) -> et::ObsValue {
    match value {
        ObsValue::Coded(uuid) => et::ObsValue::Concept(concept_ref(records, *uuid)),
        ObsValue::Numeric(n) => et::ObsValue::Number(*n),
        ObsValue::Text(text) => et::ObsValue::Text(text.clone()),
        ObsValue::Boolean(b) => et::ObsValue::Boolean(*b),
        ObsValue::Datetime(at) => et::ObsValue::Text(at.to_rfc3339()),
    }
}

/// Renders a stored obs (and its members) as a wire observation.
pub(crate) fn obs_to_wire(records: &Records, obs: &Obs, include_voided: bool) -> et::Observation {
    let group_members = obs
        .members
        .iter()
        .filter_map(|uuid| records.obs.get(uuid))
        .filter(|member| include_voided || !member.is_voided())
        .map(|member| obs_to_wire(records, member, include_voided))
        .collect();
    et::Observation {
        uuid: Some(obs.uuid),
        concept: concept_ref(records, obs.concept),
        value: obs.value.as_ref().map(|v| value_to_wire(records, v)),
        group_members,
        comment: obs.comment.clone(),
        voided: obs.is_voided(),
        void_reason: obs.voided.as_ref().map(|v| v.reason.to_string()),
        observation_date_time: Some(obs.obs_datetime),
        form_namespace: obs.form_namespace.clone(),
        form_field_path: obs.form_field_path.clone(),
        order_uuid: obs.order,
    }
}

/// Non-voided members of a group.
pub(crate) fn live_members<'r>(records: &'r Records, group: &Obs) -> Vec<&'r Obs> {
    group
        .members
        .iter()
        .filter_map(|uuid| records.obs.get(uuid))
        .filter(|member| !member.is_voided())
        .collect()
}

/// Members that were live when the group was last live: for a voided group, the members voided
/// together with it.
pub(crate) fn current_members<'r>(records: &'r Records, group: &Obs) -> Vec<&'r Obs> {
    group
        .members
        .iter()
        .filter_map(|uuid| records.obs.get(uuid))
        .filter(|member| match (&group.voided, &member.voided) {
            (_, None) => true,
            (Some(g), Some(m)) => g.date_voided == m.date_voided,
            (None, Some(_)) => false,
        })
        .collect()
}

/// Inserts `member` into `group`, linking both sides.
pub(crate) fn attach(records: &mut Records, group: EmrUuid, mut member: Obs) -> EmrResult<EmrUuid> {
    let uuid = member.uuid;
    member.group = Some(group);
    let parent = records.obs.require_mut(&group)?;
    if !parent.members.contains(&uuid) {
        parent.members.push(uuid);
    }
    records.obs.insert(member);
    Ok(uuid)
}

/// Voids an obs and every member below it. Already-voided rows are left as they are.
///
/// Returns the number of rows voided.
pub(crate) fn void_obs_tree(
    records: &mut Records,
    root: EmrUuid,
    auditor: &Auditor,
    now: DateTime<Utc>,
    reason: &NonEmptyText,
) -> EmrResult<usize> {
    let mut pending = vec![root];
    let mut voided = 0;
    while let Some(uuid) = pending.pop() {
        let obs = records.obs.require_mut(&uuid)?;
        pending.extend(obs.members.iter().copied());
        if obs.voided.is_none() {
            obs.voided = Some(VoidInfo::new(auditor, now, reason.clone()));
            obs.audit.touch(auditor, now);
            voided += 1;
        }
    }
    Ok(voided)
}

/// Creates, updates or voids one wire observation and its members.
///
/// An observation whose uuid is stored is updated in place (or voided when flagged); any other
/// observation is created, keeping its uuid when one was supplied. Returns the uuid written, or
/// `None` for a voided observation that was never stored.
pub(crate) fn upsert_observation(
    records: &mut Records,
    ctx: &ObsContext<'_>,
    wire: &et::Observation,
    group: Option<EmrUuid>,
) -> EmrResult<Option<EmrUuid>> {
    let existing = wire.uuid.filter(|uuid| records.obs.contains(uuid));

    if wire.voided {
        let reason = void_reason(wire.void_reason.as_deref())?;
        let Some(uuid) = existing else {
            return Ok(None);
        };
        check_owner(records, uuid, ctx.patient)?;
        void_obs_tree(records, uuid, ctx.auditor, ctx.now, &reason)?;
        return Ok(Some(uuid));
    }

    let concept = resolve_concept_ref(records, &wire.concept)?.clone();
    let value = value_from_wire(records, &concept, wire.value.as_ref())?;
    if let Some(order) = wire.order_uuid {
        records.orders.require(&order)?;
    }

    let uuid = match existing {
        Some(uuid) => {
            check_owner(records, uuid, ctx.patient)?;
            let obs = records.obs.require_mut(&uuid)?;
            if obs.concept != concept.uuid {
                return Err(EmrError::InvalidArgument(format!(
                    "observation {uuid} cannot change concept"
                )));
            }
            obs.value = value;
            obs.comment = wire.comment.clone();
            if let Some(at) = wire.observation_date_time {
                obs.obs_datetime = at;
            }
            obs.form_namespace = wire.form_namespace.clone();
            obs.form_field_path = wire.form_field_path.clone();
            obs.order = wire.order_uuid;
            obs.audit.touch(ctx.auditor, ctx.now);
            uuid
        }
        None => {
            let mut obs = ctx.new_obs(concept.uuid, value);
            if let Some(uuid) = wire.uuid {
                obs.uuid = uuid;
            }
            if let Some(at) = wire.observation_date_time {
                obs.obs_datetime = at;
            }
            obs.comment = wire.comment.clone();
            obs.form_namespace = wire.form_namespace.clone();
            obs.form_field_path = wire.form_field_path.clone();
            obs.order = wire.order_uuid;
            match group {
                Some(group) => attach(records, group, obs)?,
                None => {
                    let uuid = obs.uuid;
                    records.obs.insert(obs);
                    uuid
                }
            }
        }
    };

    for member in &wire.group_members {
        upsert_observation(records, ctx, member, Some(uuid))?;
    }
    Ok(Some(uuid))
}

fn check_owner(records: &Records, uuid: EmrUuid, patient: EmrUuid) -> EmrResult<()> {
    let obs = records.obs.require(&uuid)?;
    if obs.patient != patient {
        return Err(EmrError::InvalidArgument(format!(
            "observation {uuid} belongs to another patient"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EmrStore;
    use crate::test_support::fixture;

    #[test]
    fn coded_values_resolve_by_name_or_uuid() {
        let f = fixture();
        f.store
            .read(|records| {
                let disposition = records
                    .concepts
                    .require(&f.cfg.properties().disposition.concept)?;
                let by_name = value_from_wire(
                    records,
                    disposition,
                    Some(&et::ObsValue::Text("Admit".into())),
                )?;
                assert_eq!(by_name, Some(ObsValue::Coded(f.ids.admit_answer)));

                let unknown = value_from_wire(
                    records,
                    disposition,
                    Some(&et::ObsValue::Concept(ConceptRef::by_name("Teleport"))),
                );
                assert!(matches!(unknown, Err(EmrError::InvalidConcept(_))));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn numeric_concept_rejects_text() {
        let f = fixture();
        f.store
            .read(|records| {
                let weight = records.concepts.require(&f.ids.weight)?;
                let parsed =
                    value_from_wire(records, weight, Some(&et::ObsValue::Text("71.5".into())))?;
                assert_eq!(parsed, Some(ObsValue::Numeric(71.5)));
                let bad = value_from_wire(records, weight, Some(&et::ObsValue::Text("heavy".into())));
                assert!(matches!(bad, Err(EmrError::Validation(_))));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn upsert_creates_group_and_void_cascades() {
        let f = fixture();
        let auditor = f.auditor();
        let now = Utc::now();
        let ctx = ObsContext {
            patient: f.ids.patient,
            encounter: None,
            obs_datetime: now,
            auditor: &auditor,
            now,
        };

        let mut group = et::Observation::new(ConceptRef::by_uuid(f.ids.vitals), None);
        group.group_members.push(et::Observation::new(
            ConceptRef::by_uuid(f.ids.weight),
            Some(et::ObsValue::Number(70.0)),
        ));

        let group_uuid = f
            .store
            .transaction(|records| upsert_observation(records, &ctx, &group, None))
            .unwrap()
            .unwrap();

        let (members, rendered) = f
            .store
            .read(|records| {
                let stored = records.obs.require(&group_uuid)?;
                Ok((stored.members.clone(), obs_to_wire(records, stored, false)))
            })
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(rendered.group_members[0].value, Some(et::ObsValue::Number(70.0)));

        let mut void = rendered.clone();
        void.voided = true;
        void.void_reason = Some("wrong patient".into());
        f.store
            .transaction(|records| upsert_observation(records, &ctx, &void, None))
            .unwrap();

        let all_voided = f
            .store
            .read(|records| {
                Ok(records.obs.require(&group_uuid)?.is_voided()
                    && records.obs.require(&members[0])?.is_voided())
            })
            .unwrap();
        assert!(all_voided);
    }

    #[test]
    fn voiding_without_reason_fails() {
        let f = fixture();
        let auditor = f.auditor();
        let now = Utc::now();
        let ctx = ObsContext {
            patient: f.ids.patient,
            encounter: None,
            obs_datetime: now,
            auditor: &auditor,
            now,
        };
        let mut wire = et::Observation::new(ConceptRef::by_uuid(f.ids.weight), None);
        wire.uuid = Some(EmrUuid::new());
        wire.voided = true;
        let result = f
            .store
            .transaction(|records| upsert_observation(records, &ctx, &wire, None));
        assert!(matches!(result, Err(EmrError::MissingVoidReason)));
    }
}
