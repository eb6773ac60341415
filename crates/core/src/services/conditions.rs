//! Condition history versioning.
//!
//! A condition row is never edited in place once saved. [`ConditionService::save`] compares the
//! candidate with the stored row of the same uuid and either returns the stored row unchanged,
//! or writes a new row linked to it through `previous_condition`:
//!
//! - same status: the stored row is voided with reason `"updated"`;
//! - different status: the stored row is end-dated at the new row's onset date (or now).
//!
//! Changing the concept, the free text or the patient of a stored condition is rejected.

use crate::audit::{void_reason, AuditInfo, Auditor, VoidInfo};
use crate::config::CoreConfig;
use crate::constants::CONDITION_UPDATED_VOID_REASON;
use crate::error::{EmrError, EmrResult};
use crate::model::{Concept, Condition};
use crate::store::{EmrStore, Records};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{Certainty, ConditionStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A condition as submitted by a caller.
///
/// `uuid` names the stored condition being edited; leave it empty to record a new one. Free-text
/// conditions may omit `concept`, in which case the configured non-coded concept is used.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionInput {
    #[serde(default)]
    pub uuid: Option<EmrUuid>,
    pub patient: EmrUuid,
    #[serde(default)]
    pub concept: Option<EmrUuid>,
    #[serde(default)]
    pub condition_non_coded: Option<String>,
    pub status: ConditionStatus,
    #[serde(default)]
    pub verification: Option<Certainty>,
    #[serde(default)]
    pub onset_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_reason: Option<EmrUuid>,
    #[serde(default)]
    pub additional_detail: Option<String>,
}

/// Revisions of one clinical condition, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionHistory {
    pub concept: EmrUuid,
    #[serde(default)]
    pub condition_non_coded: Option<String>,
    pub conditions: Vec<Condition>,
}

pub struct ConditionService<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
}

impl<S: EmrStore> ConditionService<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self { cfg, store }
    }

    /// Saves a new condition or a revision of a stored one.
    ///
    /// All writes happen in one store transaction.
    ///
    /// # Errors
    ///
    /// - [`EmrError::Validation`] if the concept/free-text pairing or the dates are invalid.
    /// - [`EmrError::NotFound`] if the patient, concept or end reason does not exist.
    /// - [`EmrError::InvalidArgument`] if an edit changes the concept, free text or patient.
    /// - [`EmrError::InvalidState`] if the stored condition is voided.
    pub fn save(&self, candidate: ConditionInput, auditor: &Auditor) -> EmrResult<Condition> {
        let now = Utc::now();
        self.store
            .transaction(|records| save_condition(&self.cfg, records, candidate, auditor, now))
    }

    pub fn get(&self, uuid: EmrUuid) -> EmrResult<Option<Condition>> {
        self.store
            .read(|records| Ok(records.conditions.get(&uuid).cloned()))
    }

    /// Non-voided, active, open-ended conditions of a patient, newest onset first.
    pub fn active_conditions(&self, patient: EmrUuid) -> EmrResult<Vec<Condition>> {
        self.store.read(|records| {
            records.patients.require(&patient)?;
            let mut active: Vec<Condition> = records
                .conditions
                .values()
                .filter(|c| c.patient == patient && !c.is_voided())
                .filter(|c| c.status == ConditionStatus::Active && c.end_date.is_none())
                .cloned()
                .collect();
            sort_newest_first(&mut active);
            Ok(active)
        })
    }

    /// Non-voided conditions of a patient grouped per concept (or per free text).
    pub fn condition_history(&self, patient: EmrUuid) -> EmrResult<Vec<ConditionHistory>> {
        self.store.read(|records| {
            records.patients.require(&patient)?;
            let mut groups: BTreeMap<String, Vec<Condition>> = BTreeMap::new();
            for condition in records.conditions.values() {
                if condition.patient == patient && !condition.is_voided() {
                    groups
                        .entry(condition.history_key())
                        .or_default()
                        .push(condition.clone());
                }
            }

            let mut history: Vec<ConditionHistory> = groups
                .into_values()
                .map(|mut conditions| {
                    sort_newest_first(&mut conditions);
                    ConditionHistory {
                        concept: conditions[0].concept,
                        condition_non_coded: conditions[0].condition_non_coded.clone(),
                        conditions,
                    }
                })
                .collect();
            history.sort_by(|a, b| {
                newest_key(&b.conditions[0]).cmp(&newest_key(&a.conditions[0]))
            });
            Ok(history)
        })
    }

    /// The given row followed by every row it superseded, oldest last. Voided rows included.
    pub fn revision_chain(&self, uuid: EmrUuid) -> EmrResult<Vec<Condition>> {
        self.store.read(|records| {
            let mut chain = vec![records.conditions.require(&uuid)?.clone()];
            let mut seen = HashSet::from([uuid]);
            while let Some(previous) = chain.last().and_then(|c| c.previous_condition) {
                if !seen.insert(previous) {
                    break;
                }
                match records.conditions.get(&previous) {
                    Some(row) => chain.push(row.clone()),
                    None => break,
                }
            }
            Ok(chain)
        })
    }

    pub fn void(
        &self,
        uuid: EmrUuid,
        reason: Option<&str>,
        auditor: &Auditor,
    ) -> EmrResult<Condition> {
        let reason = void_reason(reason)?;
        let now = Utc::now();
        let voided = self.store.transaction(|records| {
            let condition = records.conditions.require_mut(&uuid)?;
            if condition.is_voided() {
                return Err(EmrError::InvalidState(format!(
                    "condition {uuid} is already voided"
                )));
            }
            condition.voided = Some(VoidInfo::new(auditor, now, reason));
            condition.audit.touch(auditor, now);
            Ok(condition.clone())
        })?;
        tracing::info!(condition = %uuid, "voided condition");
        Ok(voided)
    }

    pub fn unvoid(&self, uuid: EmrUuid, auditor: &Auditor) -> EmrResult<Condition> {
        let now = Utc::now();
        let restored = self.store.transaction(|records| {
            let condition = records.conditions.require_mut(&uuid)?;
            if !condition.is_voided() {
                return Err(EmrError::InvalidState(format!(
                    "condition {uuid} is not voided"
                )));
            }
            condition.voided = None;
            condition.audit.touch(auditor, now);
            Ok(condition.clone())
        })?;
        tracing::info!(condition = %uuid, "unvoided condition");
        Ok(restored)
    }

    /// Members of the configured end-reason concept set.
    pub fn end_reason_concepts(&self) -> EmrResult<Vec<Concept>> {
        let set = self.cfg.properties().conditions.end_reasons;
        self.store.read(|records| {
            let set = records.concepts.require(&set)?;
            Ok(set
                .set_members
                .iter()
                .filter_map(|uuid| records.concepts.get(uuid))
                .filter(|c| !c.retired)
                .cloned()
                .collect())
        })
    }
}

fn newest_key(c: &Condition) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
    (c.onset_date, c.audit.date_created)
}

fn sort_newest_first(conditions: &mut [Condition]) {
    conditions.sort_by(|a, b| newest_key(b).cmp(&newest_key(a)));
}

/// Resolves the concept and free text of a candidate.
fn validate(
    cfg: &CoreConfig,
    records: &Records,
    candidate: &ConditionInput,
) -> EmrResult<(EmrUuid, Option<String>)> {
    records.patients.require(&candidate.patient)?;

    let sentinel = cfg.properties().conditions.non_coded;
    let free_text = candidate
        .condition_non_coded
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let concept = match (candidate.concept, &free_text) {
        (Some(concept), _) => concept,
        (None, Some(_)) => sentinel,
        (None, None) => {
            return Err(EmrError::Validation(
                "a condition requires a concept or free text".into(),
            ))
        }
    };
    if concept == sentinel && free_text.is_none() {
        return Err(EmrError::Validation(
            "a non-coded condition requires free text".into(),
        ));
    }
    if concept != sentinel && free_text.is_some() {
        return Err(EmrError::Validation(
            "a coded condition cannot carry free text".into(),
        ));
    }
    records.concepts.require(&concept)?;

    if let Some(end_reason) = candidate.end_reason {
        records.concepts.require(&end_reason)?;
        let set = records
            .concepts
            .require(&cfg.properties().conditions.end_reasons)?;
        if !set.set_members.contains(&end_reason) {
            return Err(EmrError::InvalidConcept(format!(
                "{end_reason} is not a condition end reason"
            )));
        }
    }
    if let (Some(onset), Some(end)) = (candidate.onset_date, candidate.end_date) {
        if end < onset {
            return Err(EmrError::Validation(
                "end date cannot precede onset date".into(),
            ));
        }
    }
    Ok((concept, free_text))
}

/// Applies the revision rule inside an open transaction.
pub(crate) fn save_condition(
    cfg: &CoreConfig,
    records: &mut Records,
    candidate: ConditionInput,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<Condition> {
    let (concept, condition_non_coded) = validate(cfg, records, &candidate)?;

    let existing = candidate
        .uuid
        .and_then(|uuid| records.conditions.get(&uuid))
        .cloned();

    // An ended condition without an explicit end date keeps the stored one.
    let defaulted_end = candidate.end_reason.is_some() && candidate.end_date.is_none();
    let end_date = if defaulted_end {
        existing.as_ref().and_then(|e| e.end_date).or(Some(now))
    } else {
        candidate.end_date
    };
    let mut row = Condition {
        uuid: candidate.uuid.unwrap_or_default(),
        patient: candidate.patient,
        concept,
        condition_non_coded,
        status: candidate.status,
        verification: candidate.verification,
        onset_date: candidate.onset_date,
        end_date,
        end_reason: candidate.end_reason,
        additional_detail: candidate.additional_detail,
        previous_condition: None,
        voided: None,
        audit: AuditInfo::created(auditor, now),
    };

    let Some(existing) = existing else {
        records.conditions.insert(row.clone());
        tracing::info!(condition = %row.uuid, patient = %row.patient, "created condition");
        return Ok(row);
    };

    if existing.is_voided() {
        return Err(EmrError::InvalidState(format!(
            "condition {} is voided and cannot be revised",
            existing.uuid
        )));
    }
    if existing.same_clinical_content(&row) {
        tracing::debug!(condition = %existing.uuid, "condition unchanged");
        return Ok(existing);
    }
    if existing.patient != row.patient {
        return Err(EmrError::InvalidArgument(
            "the patient of an existing condition cannot be changed".into(),
        ));
    }
    if existing.concept != row.concept || existing.condition_non_coded != row.condition_non_coded {
        return Err(EmrError::InvalidArgument(
            "the concept of an existing condition cannot be changed".into(),
        ));
    }

    row.uuid = EmrUuid::new();
    row.previous_condition = Some(existing.uuid);

    let status_changed = existing.status != row.status;
    let boundary = row.onset_date.unwrap_or(now);
    if status_changed {
        if existing.onset_date.is_some_and(|onset| boundary < onset) {
            return Err(EmrError::Validation(
                "a revision cannot start before the condition it replaces".into(),
            ));
        }
        row.onset_date = Some(boundary);
        row.end_date = match row.end_date {
            _ if row.end_reason.is_none() => None,
            Some(end) if end < boundary && defaulted_end => Some(boundary.max(now)),
            Some(end) if end < boundary => {
                return Err(EmrError::Validation(
                    "end date cannot precede onset date".into(),
                ))
            }
            end => end,
        };
    }

    let stored = records.conditions.require_mut(&existing.uuid)?;
    if status_changed {
        stored.end_date = Some(boundary);
    } else {
        let reason = NonEmptyText::new(CONDITION_UPDATED_VOID_REASON)?;
        stored.voided = Some(VoidInfo::new(auditor, now, reason));
    }
    stored.audit.touch(auditor, now);
    records.conditions.insert(row.clone());

    tracing::info!(
        condition = %row.uuid,
        previous = %existing.uuid,
        status_changed,
        "revised condition"
    );
    Ok(row)
}
