//! Diagnoses, both obs-encoded and first-class.
//!
//! An obs-encoded diagnosis is a top-level obs group whose concept is the configured diagnosis
//! set. Its members carry the answer (coded or free text), the certainty and the order.
//! [`DiagnosisMetadata`] converts between that shape and a [`ObsDiagnosis`] value.

use super::observations::{
    attach, concept_ref, current_members, live_members, resolve_concept_ref, void_obs_tree,
    ObsContext,
};
use crate::audit::{void_reason, AuditInfo, Auditor};
use crate::config::CoreConfig;
use crate::error::{EmrError, EmrResult};
use crate::model::{CodedOrFreeText, Diagnosis, Obs, ObsValue};
use crate::properties::DiagnosisConcepts;
use crate::store::{EmrStore, Records};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{self as et, Certainty, DiagnosisOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The clinical content of one obs-encoded diagnosis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObsDiagnosis {
    pub answer: CodedOrFreeText,
    pub certainty: Certainty,
    pub order: DiagnosisOrder,
}

/// Reads and writes the obs-group encoding of diagnoses.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosisMetadata<'a> {
    concepts: &'a DiagnosisConcepts,
}

impl<'a> DiagnosisMetadata<'a> {
    pub fn new(cfg: &'a CoreConfig) -> Self {
        Self {
            concepts: &cfg.properties().diagnosis,
        }
    }

    /// True for top-level groups of the diagnosis set concept.
    pub fn is_diagnosis(&self, obs: &Obs) -> bool {
        obs.concept == self.concepts.set && obs.group.is_none()
    }

    /// Decodes a diagnosis obs group.
    ///
    /// A missing order member reads as secondary.
    ///
    /// # Errors
    ///
    /// Returns [`EmrError::Validation`] when the group is not a diagnosis, or lacks the answer or
    /// the certainty member.
    pub fn to_diagnosis(&self, records: &Records, group: &Obs) -> EmrResult<ObsDiagnosis> {
        if !self.is_diagnosis(group) {
            return Err(EmrError::Validation(format!(
                "obs {} is not a diagnosis group",
                group.uuid
            )));
        }
        let c = self.concepts;
        let mut answer = None;
        let mut certainty = None;
        let mut order = None;
        for member in current_members(records, group) {
            match &member.value {
                Some(ObsValue::Coded(value)) if member.concept == c.coded => {
                    answer = Some(CodedOrFreeText::coded(*value));
                }
                Some(ObsValue::Text(text)) if member.concept == c.non_coded => {
                    if let Ok(text) = NonEmptyText::new(text) {
                        answer = Some(CodedOrFreeText::free_text(text));
                    }
                }
                Some(ObsValue::Coded(value)) if member.concept == c.certainty => {
                    certainty = self.certainty_for(*value);
                }
                Some(ObsValue::Coded(value)) if member.concept == c.order => {
                    order = self.order_for(*value);
                }
                _ => {}
            }
        }

        let answer = answer.ok_or_else(|| {
            EmrError::Validation(format!("diagnosis group {} has no answer", group.uuid))
        })?;
        let certainty = certainty.ok_or_else(|| {
            EmrError::Validation(format!("diagnosis group {} has no certainty", group.uuid))
        })?;
        Ok(ObsDiagnosis {
            answer,
            certainty,
            order: order.unwrap_or(DiagnosisOrder::Secondary),
        })
    }

    /// Writes a new diagnosis obs group and returns its uuid.
    pub(crate) fn build_obs_group(
        &self,
        records: &mut Records,
        ctx: &ObsContext<'_>,
        diagnosis: &ObsDiagnosis,
    ) -> EmrResult<EmrUuid> {
        let group = ctx.new_obs(self.concepts.set, None);
        let group_uuid = group.uuid;
        records.obs.insert(group);
        for (concept, value) in self.member_values(diagnosis)? {
            attach(records, group_uuid, ctx.new_obs(concept, Some(value)))?;
        }
        Ok(group_uuid)
    }

    /// Rewrites the members of an existing diagnosis group in place.
    pub(crate) fn update_obs_group(
        &self,
        records: &mut Records,
        ctx: &ObsContext<'_>,
        group_uuid: EmrUuid,
        diagnosis: &ObsDiagnosis,
    ) -> EmrResult<()> {
        let group = records.obs.require(&group_uuid)?.clone();
        if !self.is_diagnosis(&group) {
            return Err(EmrError::InvalidArgument(format!(
                "obs {group_uuid} is not a diagnosis group"
            )));
        }
        if group.is_voided() {
            return Err(EmrError::InvalidState(format!(
                "diagnosis group {group_uuid} is voided"
            )));
        }
        let wanted = self.member_values(diagnosis)?;
        let replaced = NonEmptyText::new(crate::constants::DIAGNOSIS_REVISED_VOID_REASON)?;

        let live: Vec<(EmrUuid, EmrUuid)> = live_members(records, &group)
            .into_iter()
            .map(|m| (m.uuid, m.concept))
            .collect();
        for (member, concept) in &live {
            if !wanted.iter().any(|(c, _)| c == concept) {
                void_obs_tree(records, *member, ctx.auditor, ctx.now, &replaced)?;
            }
        }
        for (concept, value) in wanted {
            match live.iter().find(|(_, c)| *c == concept) {
                Some((member, _)) => {
                    let obs = records.obs.require_mut(member)?;
                    if obs.value.as_ref() != Some(&value) {
                        obs.value = Some(value);
                        obs.audit.touch(ctx.auditor, ctx.now);
                    }
                }
                None => {
                    attach(records, group_uuid, ctx.new_obs(concept, Some(value)))?;
                }
            }
        }
        records.obs.require_mut(&group_uuid)?.audit.touch(ctx.auditor, ctx.now);
        Ok(())
    }

    fn member_values(&self, diagnosis: &ObsDiagnosis) -> EmrResult<Vec<(EmrUuid, ObsValue)>> {
        let c = self.concepts;
        let answer = match (&diagnosis.answer.coded, &diagnosis.answer.non_coded) {
            (Some(coded), None) => (c.coded, ObsValue::Coded(*coded)),
            (None, Some(text)) => (c.non_coded, ObsValue::Text(text.to_string())),
            _ => {
                return Err(EmrError::Validation(
                    "diagnosis requires exactly one of a coded or a free-text answer".into(),
                ))
            }
        };
        let certainty = match diagnosis.certainty {
            Certainty::Confirmed => c.confirmed,
            Certainty::Presumed => c.presumed,
        };
        let order = match diagnosis.order {
            DiagnosisOrder::Primary => c.primary,
            DiagnosisOrder::Secondary => c.secondary,
        };
        Ok(vec![
            answer,
            (c.certainty, ObsValue::Coded(certainty)),
            (c.order, ObsValue::Coded(order)),
        ])
    }

    fn certainty_for(&self, answer: EmrUuid) -> Option<Certainty> {
        if answer == self.concepts.confirmed {
            Some(Certainty::Confirmed)
        } else if answer == self.concepts.presumed {
            Some(Certainty::Presumed)
        } else {
            None
        }
    }

    fn order_for(&self, answer: EmrUuid) -> Option<DiagnosisOrder> {
        if answer == self.concepts.primary {
            Some(DiagnosisOrder::Primary)
        } else if answer == self.concepts.secondary {
            Some(DiagnosisOrder::Secondary)
        } else {
            None
        }
    }

    /// Renders a diagnosis group as a wire diagnosis.
    pub(crate) fn to_wire(&self, records: &Records, group: &Obs) -> EmrResult<et::Diagnosis> {
        let decoded = self.to_diagnosis(records, group)?;
        Ok(et::Diagnosis {
            existing_obs: Some(group.uuid),
            coded_answer: decoded.answer.coded.map(|uuid| concept_ref(records, uuid)),
            free_text_answer: decoded.answer.non_coded.map(|t| t.into_inner()),
            certainty: decoded.certainty,
            order: decoded.order,
            diagnosis_date_time: Some(group.obs_datetime),
            voided: group.is_voided(),
            void_reason: group.voided.as_ref().map(|v| v.reason.to_string()),
            comments: group.comment.clone(),
        })
    }

    /// A transient first-class view of an unmigrated group. Its uuid is the group's uuid.
    pub(crate) fn as_record(&self, records: &Records, group: &Obs) -> EmrResult<Diagnosis> {
        let decoded = self.to_diagnosis(records, group)?;
        Ok(Diagnosis {
            uuid: group.uuid,
            patient: group.patient,
            encounter: group.encounter,
            diagnosis: decoded.answer,
            certainty: decoded.certainty,
            rank: decoded.order.rank(),
            condition: None,
            form_namespace: group.form_namespace.clone(),
            form_field_path: group.form_field_path.clone(),
            source_obs: Some(group.uuid),
            voided: group.voided.clone(),
            audit: group.audit.clone(),
        })
    }
}

/// Converts a wire diagnosis answer into a validated [`ObsDiagnosis`].
fn from_wire(records: &Records, wire: &et::Diagnosis) -> EmrResult<ObsDiagnosis> {
    wire.validate_answer()?;
    let answer = match &wire.coded_answer {
        Some(coded) => CodedOrFreeText::coded(resolve_concept_ref(records, coded)?.uuid),
        None => CodedOrFreeText::free_text(NonEmptyText::new(
            wire.free_text_answer.as_deref().unwrap_or_default(),
        )?),
    };
    Ok(ObsDiagnosis {
        answer,
        certainty: wire.certainty,
        order: wire.order,
    })
}

/// Saves wire diagnoses of one encounter inside an open transaction.
///
/// Returns the uuids of the groups written (voided groups included).
pub(crate) fn save_diagnoses_in(
    cfg: &CoreConfig,
    records: &mut Records,
    ctx: &ObsContext<'_>,
    diagnoses: &[et::Diagnosis],
) -> EmrResult<Vec<EmrUuid>> {
    let metadata = DiagnosisMetadata::new(cfg);
    let mut written = Vec::with_capacity(diagnoses.len());
    for wire in diagnoses {
        if wire.voided {
            let reason = void_reason(wire.void_reason.as_deref())?;
            if let Some(group) = wire.existing_obs {
                owned_by(records, group, ctx.patient)?;
                void_obs_tree(records, group, ctx.auditor, ctx.now, &reason)?;
                written.push(group);
            }
            continue;
        }

        let decoded = from_wire(records, wire)?;
        let at = wire.diagnosis_date_time.unwrap_or(ctx.obs_datetime);
        let group = match wire.existing_obs {
            Some(group) => {
                owned_by(records, group, ctx.patient)?;
                metadata.update_obs_group(records, ctx, group, &decoded)?;
                group
            }
            None => metadata.build_obs_group(records, ctx, &decoded)?,
        };
        let obs = records.obs.require_mut(&group)?;
        obs.obs_datetime = at;
        obs.comment = wire.comments.clone();
        written.push(group);
    }
    Ok(written)
}

fn owned_by(records: &Records, obs: EmrUuid, patient: EmrUuid) -> EmrResult<()> {
    if records.obs.require(&obs)?.patient != patient {
        return Err(EmrError::InvalidArgument(format!(
            "obs {obs} belongs to another patient"
        )));
    }
    Ok(())
}

/// A first-class diagnosis as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisInput {
    pub patient: EmrUuid,
    #[serde(default)]
    pub encounter: Option<EmrUuid>,
    pub answer: CodedOrFreeText,
    pub certainty: Certainty,
    pub order: DiagnosisOrder,
    #[serde(default)]
    pub condition: Option<EmrUuid>,
}

pub struct DiagnosisService<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
}

impl<S: EmrStore> DiagnosisService<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self { cfg, store }
    }

    /// Stores obs-encoded diagnoses against an existing encounter.
    pub fn save_encounter_diagnoses(
        &self,
        encounter: EmrUuid,
        diagnoses: &[et::Diagnosis],
        auditor: &Auditor,
    ) -> EmrResult<Vec<EmrUuid>> {
        let now = Utc::now();
        let written = self.store.transaction(|records| {
            let enc = records.encounters.require(&encounter)?.clone();
            let ctx = ObsContext {
                patient: enc.patient,
                encounter: Some(enc.uuid),
                obs_datetime: enc.encounter_datetime,
                auditor,
                now,
            };
            save_diagnoses_in(&self.cfg, records, &ctx, diagnoses)
        })?;
        tracing::info!(encounter = %encounter, count = written.len(), "saved diagnoses");
        Ok(written)
    }

    /// Stores a first-class diagnosis.
    pub fn save_diagnosis(&self, input: DiagnosisInput, auditor: &Auditor) -> EmrResult<Diagnosis> {
        let now = Utc::now();
        let saved = self.store.transaction(|records| {
            records.patients.require(&input.patient)?;
            if let Some(encounter) = input.encounter {
                if records.encounters.require(&encounter)?.patient != input.patient {
                    return Err(EmrError::InvalidArgument(
                        "encounter belongs to another patient".into(),
                    ));
                }
            }
            if !input.answer.is_valid() {
                return Err(EmrError::Validation(
                    "diagnosis requires exactly one of a coded or a free-text answer".into(),
                ));
            }
            if let Some(coded) = input.answer.coded {
                records.concepts.require(&coded)?;
            }
            if let Some(condition) = input.condition {
                records.conditions.require(&condition)?;
            }
            let diagnosis = Diagnosis {
                uuid: EmrUuid::new(),
                patient: input.patient,
                encounter: input.encounter,
                diagnosis: input.answer,
                certainty: input.certainty,
                rank: input.order.rank(),
                condition: input.condition,
                form_namespace: None,
                form_field_path: None,
                source_obs: None,
                voided: None,
                audit: AuditInfo::created(auditor, now),
            };
            records.diagnoses.insert(diagnosis.clone());
            Ok(diagnosis)
        })?;
        tracing::info!(diagnosis = %saved.uuid, patient = %saved.patient, "saved diagnosis");
        Ok(saved)
    }

    /// Non-voided diagnoses of an encounter: first-class records plus unmigrated obs groups.
    pub fn diagnoses_for_encounter(&self, encounter: EmrUuid) -> EmrResult<Vec<Diagnosis>> {
        self.store.read(|records| {
            records.encounters.require(&encounter)?;
            collect(&self.cfg, records, |d| d.encounter == Some(encounter))
        })
    }

    pub fn primary_diagnoses(&self, encounter: EmrUuid) -> EmrResult<Vec<Diagnosis>> {
        let mut all = self.diagnoses_for_encounter(encounter)?;
        all.retain(Diagnosis::is_primary);
        Ok(all)
    }

    /// Non-voided diagnoses of a patient recorded at or after `since`, newest first.
    pub fn diagnoses_for_patient(
        &self,
        patient: EmrUuid,
        since: Option<DateTime<Utc>>,
    ) -> EmrResult<Vec<Diagnosis>> {
        self.store.read(|records| {
            records.patients.require(&patient)?;
            let mut found = collect(&self.cfg, records, |d| d.patient == patient)?;
            if let Some(since) = since {
                found.retain(|d| recorded_at(records, d) >= since);
            }
            found.sort_by_key(|d| std::cmp::Reverse(recorded_at(records, d)));
            Ok(found)
        })
    }
}

fn collect(
    cfg: &CoreConfig,
    records: &Records,
    keep: impl Fn(&Diagnosis) -> bool,
) -> EmrResult<Vec<Diagnosis>> {
    let metadata = DiagnosisMetadata::new(cfg);
    let mut found: Vec<Diagnosis> = records
        .diagnoses
        .values()
        .filter(|d| d.voided.is_none() && keep(d))
        .cloned()
        .collect();
    for obs in records.obs.values() {
        if obs.is_voided() || !metadata.is_diagnosis(obs) {
            continue;
        }
        match metadata.as_record(records, obs) {
            Ok(diagnosis) if keep(&diagnosis) => found.push(diagnosis),
            Ok(_) => {}
            Err(err) => tracing::warn!(obs = %obs.uuid, error = %err, "unreadable diagnosis group"),
        }
    }
    Ok(found)
}

/// When a diagnosis was made: its encounter's datetime, or when it was recorded.
fn recorded_at(records: &Records, diagnosis: &Diagnosis) -> DateTime<Utc> {
    if let Some(source) = diagnosis.source_obs.and_then(|uuid| records.obs.get(&uuid)) {
        return source.obs_datetime;
    }
    diagnosis
        .encounter
        .and_then(|uuid| records.encounters.get(&uuid))
        .map(|e| e.encounter_datetime)
        .unwrap_or(diagnosis.audit.date_created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DIAGNOSIS_REVISED_VOID_REASON;
    use crate::store::MemoryStore;
    use crate::test_support::{fixture, Fixture};
    use encounter_transaction::ConceptRef;

    fn wire(coded: Option<EmrUuid>, text: Option<&str>, order: DiagnosisOrder) -> et::Diagnosis {
        et::Diagnosis {
            existing_obs: None,
            coded_answer: coded.map(ConceptRef::by_uuid),
            free_text_answer: text.map(str::to_string),
            certainty: Certainty::Presumed,
            order,
            diagnosis_date_time: None,
            voided: false,
            void_reason: None,
            comments: None,
        }
    }

    fn service(f: &Fixture) -> DiagnosisService<MemoryStore> {
        DiagnosisService::new(f.cfg.clone(), f.store.clone())
    }

    #[test]
    fn obs_encoding_round_trips_through_metadata() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let svc = service(&f);
        let groups = svc
            .save_encounter_diagnoses(
                enc,
                &[
                    wire(Some(f.ids.malaria), None, DiagnosisOrder::Primary),
                    wire(None, Some("odd rash"), DiagnosisOrder::Secondary),
                ],
                &f.auditor(),
            )
            .unwrap();
        assert_eq!(groups.len(), 2);

        let found = svc.diagnoses_for_encounter(enc).unwrap();
        assert_eq!(found.len(), 2);
        let primary = svc.primary_diagnoses(enc).unwrap();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].diagnosis.coded, Some(f.ids.malaria));
        assert_eq!(primary[0].certainty, Certainty::Presumed);
        assert_eq!(primary[0].source_obs, Some(groups[0]));
    }

    #[test]
    fn both_answers_are_rejected() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let result = service(&f).save_encounter_diagnoses(
            enc,
            &[wire(Some(f.ids.malaria), Some("malaria"), DiagnosisOrder::Primary)],
            &f.auditor(),
        );
        assert!(matches!(result, Err(EmrError::Validation(_))));
    }

    #[test]
    fn existing_group_is_updated_in_place() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let svc = service(&f);
        let auditor = f.auditor();
        let groups = svc
            .save_encounter_diagnoses(
                enc,
                &[wire(Some(f.ids.malaria), None, DiagnosisOrder::Secondary)],
                &auditor,
            )
            .unwrap();

        let mut edit = wire(Some(f.ids.fever), None, DiagnosisOrder::Primary);
        edit.existing_obs = Some(groups[0]);
        edit.certainty = Certainty::Confirmed;
        svc.save_encounter_diagnoses(enc, &[edit], &auditor).unwrap();

        let found = svc.diagnoses_for_encounter(enc).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uuid, groups[0]);
        assert_eq!(found[0].diagnosis.coded, Some(f.ids.fever));
        assert_eq!(found[0].certainty, Certainty::Confirmed);
        assert!(found[0].is_primary());
    }

    #[test]
    fn group_without_certainty_is_malformed() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let groups = service(&f)
            .save_encounter_diagnoses(
                enc,
                &[wire(Some(f.ids.malaria), None, DiagnosisOrder::Primary)],
                &f.auditor(),
            )
            .unwrap();
        let certainty = f.cfg.properties().diagnosis.certainty;
        let err = f
            .store
            .transaction(|records| {
                let group = records.obs.require(&groups[0])?.clone();
                for member in &group.members {
                    if records.obs.require(member)?.concept == certainty {
                        records.obs.require_mut(member)?.value = None;
                    }
                }
                DiagnosisMetadata::new(&f.cfg).to_diagnosis(records, &group)
            })
            .unwrap_err();
        assert!(err.to_string().contains("no certainty"));
    }

    #[test]
    fn first_class_diagnosis_is_listed_for_patient() {
        let f = fixture();
        let svc = service(&f);
        let saved = svc
            .save_diagnosis(
                DiagnosisInput {
                    patient: f.ids.patient,
                    encounter: None,
                    answer: CodedOrFreeText::coded(f.ids.fever),
                    certainty: Certainty::Confirmed,
                    order: DiagnosisOrder::Primary,
                    condition: None,
                },
                &f.auditor(),
            )
            .unwrap();
        assert_eq!(saved.rank, 1);
        let listed = svc.diagnoses_for_patient(f.ids.patient, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(svc
            .diagnoses_for_patient(f.ids.other_patient, None)
            .unwrap()
            .is_empty());
    }

    fn first_class(f: &Fixture, answer: CodedOrFreeText, order: DiagnosisOrder) -> DiagnosisInput {
        DiagnosisInput {
            patient: f.ids.patient,
            encounter: None,
            answer,
            certainty: Certainty::Confirmed,
            order,
            condition: None,
        }
    }

    #[test]
    fn first_class_diagnosis_needs_exactly_one_answer() {
        let f = fixture();
        let both = CodedOrFreeText {
            coded: Some(f.ids.malaria),
            non_coded: Some(NonEmptyText::new("malaria").unwrap()),
        };
        let result =
            service(&f).save_diagnosis(first_class(&f, both, DiagnosisOrder::Primary), &f.auditor());
        assert!(matches!(result, Err(EmrError::Validation(_))));
        assert_eq!(f.store.read(|r| Ok(r.diagnoses.len())).unwrap(), 0);
    }

    #[test]
    fn first_class_diagnosis_rejects_another_patients_encounter() {
        let f = fixture();
        let mut input = first_class(
            &f,
            CodedOrFreeText::coded(f.ids.malaria),
            DiagnosisOrder::Primary,
        );
        input.encounter = Some(f.encounter(f.ids.other_patient));
        assert!(matches!(
            service(&f).save_diagnosis(input, &f.auditor()),
            Err(EmrError::InvalidArgument(_))
        ));
    }

    #[test]
    fn primary_diagnoses_mix_records_and_obs_groups() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let svc = service(&f);
        let auditor = f.auditor();
        svc.save_encounter_diagnoses(
            enc,
            &[
                wire(Some(f.ids.malaria), None, DiagnosisOrder::Primary),
                wire(None, Some("odd rash"), DiagnosisOrder::Secondary),
            ],
            &auditor,
        )
        .unwrap();
        let mut fever = first_class(
            &f,
            CodedOrFreeText::coded(f.ids.fever),
            DiagnosisOrder::Primary,
        );
        fever.encounter = Some(enc);
        svc.save_diagnosis(fever, &auditor).unwrap();
        let mut secondary = first_class(
            &f,
            CodedOrFreeText::coded(f.ids.weight),
            DiagnosisOrder::Secondary,
        );
        secondary.encounter = Some(enc);
        svc.save_diagnosis(secondary, &auditor).unwrap();

        let mut primary: Vec<_> = svc
            .primary_diagnoses(enc)
            .unwrap()
            .into_iter()
            .map(|d| d.diagnosis.coded)
            .collect();
        primary.sort();
        let mut expected = vec![Some(f.ids.malaria), Some(f.ids.fever)];
        expected.sort();
        assert_eq!(primary, expected);
        assert_eq!(svc.diagnoses_for_encounter(enc).unwrap().len(), 4);
    }

    #[test]
    fn replaced_members_carry_the_diagnosis_void_reason() {
        let f = fixture();
        let enc = f.encounter(f.ids.patient);
        let svc = service(&f);
        let auditor = f.auditor();
        let groups = svc
            .save_encounter_diagnoses(
                enc,
                &[wire(Some(f.ids.malaria), None, DiagnosisOrder::Primary)],
                &auditor,
            )
            .unwrap();

        let mut edit = wire(None, Some("odd rash"), DiagnosisOrder::Primary);
        edit.existing_obs = Some(groups[0]);
        svc.save_encounter_diagnoses(enc, &[edit], &auditor).unwrap();

        let coded = f.cfg.properties().diagnosis.coded;
        let reasons: Vec<String> = f
            .store
            .read(|records| {
                Ok(records
                    .obs
                    .values()
                    .filter(|o| o.concept == coded)
                    .filter_map(|o| o.voided.as_ref().map(|v| v.reason.as_str().to_string()))
                    .collect())
            })
            .unwrap();
        assert_eq!(reasons, vec![DIAGNOSIS_REVISED_VOID_REASON.to_string()]);
    }
}
