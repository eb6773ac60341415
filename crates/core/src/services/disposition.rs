//! Dispositions: a coded clinical decision stored as an obs group.
//!
//! The group uses the configured disposition set concept. One member holds the coded answer
//! for the disposition code; any further members are the disposition's additional observations.

use super::observations::{
    attach, current_members, live_members, obs_to_wire, upsert_observation, void_obs_tree,
    ObsContext,
};
use crate::audit::void_reason;
use crate::config::CoreConfig;
use crate::error::{EmrError, EmrResult};
use crate::model::{Obs, ObsValue};
use crate::store::Records;
use emr_uuid::EmrUuid;
use encounter_transaction::{self as et, AdtAction};

/// Outcome of saving a disposition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SavedDisposition {
    pub group: EmrUuid,
    pub adt_action: Option<AdtAction>,
}

pub(crate) fn is_disposition(cfg: &CoreConfig, obs: &Obs) -> bool {
    obs.concept == cfg.properties().disposition.set && obs.group.is_none()
}

/// Creates, updates or voids the disposition of an encounter inside an open transaction.
pub(crate) fn save_disposition_in(
    cfg: &CoreConfig,
    records: &mut Records,
    ctx: &ObsContext<'_>,
    wire: &et::Disposition,
) -> EmrResult<Option<SavedDisposition>> {
    let concepts = &cfg.properties().disposition;

    if wire.voided {
        let reason = void_reason(wire.void_reason.as_deref())?;
        let Some(group) = wire.existing_obs else {
            return Ok(None);
        };
        require_group(cfg, records, group, ctx.patient)?;
        void_obs_tree(records, group, ctx.auditor, ctx.now, &reason)?;
        return Ok(Some(SavedDisposition {
            group,
            adt_action: None,
        }));
    }

    let option = concepts
        .by_code(&wire.code)
        .ok_or_else(|| EmrError::InvalidConcept(format!("unknown disposition '{}'", wire.code)))?
        .clone();
    let at = wire.disposition_date_time.unwrap_or(ctx.obs_datetime);

    let group = match wire.existing_obs {
        Some(group) => {
            require_group(cfg, records, group, ctx.patient)?;
            let stored = records.obs.require(&group)?.clone();
            let answer = live_members(records, &stored)
                .into_iter()
                .find(|m| m.concept == concepts.concept)
                .map(|m| m.uuid);
            match answer {
                Some(member) => {
                    let obs = records.obs.require_mut(&member)?;
                    obs.value = Some(ObsValue::Coded(option.answer));
                    obs.audit.touch(ctx.auditor, ctx.now);
                }
                None => {
                    let member = ctx.new_obs(concepts.concept, Some(ObsValue::Coded(option.answer)));
                    attach(records, group, member)?;
                }
            }
            let obs = records.obs.require_mut(&group)?;
            obs.obs_datetime = at;
            obs.audit.touch(ctx.auditor, ctx.now);
            group
        }
        None => {
            let mut obs = ctx.new_obs(concepts.set, None);
            obs.obs_datetime = at;
            let group = obs.uuid;
            records.obs.insert(obs);
            let mut member = ctx.new_obs(concepts.concept, Some(ObsValue::Coded(option.answer)));
            member.obs_datetime = at;
            attach(records, group, member)?;
            group
        }
    };

    for additional in &wire.additional_obs {
        upsert_observation(records, ctx, additional, Some(group))?;
    }

    Ok(Some(SavedDisposition {
        group,
        adt_action: option.adt_action,
    }))
}

fn require_group(
    cfg: &CoreConfig,
    records: &Records,
    group: EmrUuid,
    patient: EmrUuid,
) -> EmrResult<()> {
    let obs = records.obs.require(&group)?;
    if !is_disposition(cfg, obs) {
        return Err(EmrError::InvalidArgument(format!(
            "obs {group} is not a disposition"
        )));
    }
    if obs.patient != patient {
        return Err(EmrError::InvalidArgument(format!(
            "obs {group} belongs to another patient"
        )));
    }
    Ok(())
}

/// Renders a disposition group, or `None` when its answer is not a configured disposition.
pub(crate) fn disposition_to_wire(
    cfg: &CoreConfig,
    records: &Records,
    group: &Obs,
    include_voided: bool,
) -> Option<et::Disposition> {
    let concepts = &cfg.properties().disposition;
    let members: Vec<&Obs> = group
        .members
        .iter()
        .filter_map(|uuid| records.obs.get(uuid))
        .filter(|m| include_voided || !m.is_voided())
        .collect();

    let option = current_members(records, group)
        .into_iter()
        .filter(|m| m.concept == concepts.concept)
        .find_map(|m| m.value.as_ref().and_then(ObsValue::as_coded))
        .and_then(|answer| concepts.by_answer(answer))?;

    Some(et::Disposition {
        code: option.code.clone(),
        existing_obs: Some(group.uuid),
        voided: group.is_voided(),
        void_reason: group.voided.as_ref().map(|v| v.reason.to_string()),
        disposition_date_time: Some(group.obs_datetime),
        additional_obs: members
            .iter()
            .filter(|m| m.concept != concepts.concept)
            .map(|m| obs_to_wire(records, m, include_voided))
            .collect(),
    })
}
