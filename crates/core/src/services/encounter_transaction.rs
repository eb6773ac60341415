//! Saving and reading encounter transactions.
//!
//! A save runs in one store transaction: the encounter and its visit are resolved or created,
//! then orders, observations, diagnoses and the disposition are written against it. A read maps
//! the stored encounter back onto the same wire shape.

use super::diagnoses::{save_diagnoses_in, DiagnosisMetadata};
use super::disposition::{disposition_to_wire, is_disposition, save_disposition_in};
use super::observations::{obs_to_wire, upsert_observation, void_obs_tree, ObsContext};
use super::orders::{drug_order_to_wire, save_orders_in, test_order_to_wire};
use super::visits::{ensure_visit, VisitRequest};
use crate::audit::{AuditInfo, Auditor};
use crate::config::CoreConfig;
use crate::constants::DISPOSITION_REPLACED_VOID_REASON;
use crate::error::{EmrError, EmrResult};
use crate::model::{Encounter, EncounterProvider, Obs};
use crate::store::{EmrStore, Records};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::{self as et, AdtAction, EncounterTransaction};
use std::sync::Arc;

pub struct EncounterTransactionService<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
}

impl<S: EmrStore> EncounterTransactionService<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self { cfg, store }
    }

    /// Saves a transaction and returns it as stored, with every server-assigned uuid filled in.
    ///
    /// # Errors
    ///
    /// Any validation or lookup failure aborts the whole save; nothing is written.
    pub fn save(
        &self,
        transaction: &EncounterTransaction,
        auditor: &Auditor,
    ) -> EmrResult<EncounterTransaction> {
        let now = Utc::now();
        let (encounter, adt_action) = self
            .store
            .transaction(|records| save_in(&self.cfg, records, transaction, auditor, now))?;
        tracing::info!(
            encounter = %encounter,
            patient = %transaction.patient_uuid,
            observations = transaction.observations.len(),
            diagnoses = transaction.diagnoses.len(),
            orders = transaction.drug_orders.len() + transaction.test_orders.len(),
            "saved encounter transaction"
        );
        let mut saved = self.get(encounter, false)?;
        saved.adt_action = adt_action;
        Ok(saved)
    }

    pub fn get(&self, encounter: EmrUuid, include_voided: bool) -> EmrResult<EncounterTransaction> {
        self.store.read(|records| {
            let encounter = records.encounters.require(&encounter)?;
            Ok(to_wire(&self.cfg, records, encounter, include_voided))
        })
    }

    /// Non-voided encounters of a patient, newest first, optionally narrowed to one visit or
    /// encounter type.
    pub fn find(
        &self,
        patient: EmrUuid,
        visit: Option<EmrUuid>,
        encounter_type: Option<EmrUuid>,
    ) -> EmrResult<Vec<EncounterTransaction>> {
        self.store.read(|records| {
            records.patients.require(&patient)?;
            let mut found: Vec<&Encounter> = records
                .encounters
                .values()
                .filter(|e| e.patient == patient && e.voided.is_none())
                .filter(|e| visit.map_or(true, |v| e.visit == Some(v)))
                .filter(|e| encounter_type.map_or(true, |t| e.encounter_type == t))
                .collect();
            found.sort_by_key(|e| std::cmp::Reverse(e.encounter_datetime));
            Ok(found
                .into_iter()
                .map(|e| to_wire(&self.cfg, records, e, false))
                .collect())
        })
    }
}

fn save_in(
    cfg: &CoreConfig,
    records: &mut Records,
    wire: &EncounterTransaction,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<(EmrUuid, Option<AdtAction>)> {
    let patient = wire.patient_uuid;
    records.patients.require(&patient)?;
    for provider in &wire.providers {
        if !records.providers.contains(&provider.uuid) {
            return Err(EmrError::UnknownProvider(provider.uuid.to_string()));
        }
    }
    if let Some(location) = wire.location_uuid {
        records.locations.require(&location)?;
    }

    let encounter = match wire.encounter_uuid.filter(|u| records.encounters.contains(u)) {
        Some(uuid) => update_encounter(records, uuid, wire, auditor, now)?,
        None => create_encounter(cfg, records, wire, auditor, now)?,
    };
    let stored = records.encounters.require(&encounter)?;
    let ctx = ObsContext {
        patient,
        encounter: Some(encounter),
        obs_datetime: stored.encounter_datetime,
        auditor,
        now,
    };

    // obs may point at orders placed in the same submission
    save_orders_in(
        records,
        encounter,
        &wire.drug_orders,
        &wire.test_orders,
        auditor,
        now,
    )?;
    for observation in &wire.observations {
        upsert_observation(records, &ctx, observation, None)?;
    }
    save_diagnoses_in(cfg, records, &ctx, &wire.diagnoses)?;

    let mut adt_action = None;
    if let Some(disposition) = &wire.disposition {
        if disposition.existing_obs.is_none() && !disposition.voided {
            replace_dispositions(cfg, records, &ctx)?;
        }
        adt_action = save_disposition_in(cfg, records, &ctx, disposition)?
            .and_then(|saved| saved.adt_action);
    }
    Ok((encounter, adt_action))
}

fn create_encounter(
    cfg: &CoreConfig,
    records: &mut Records,
    wire: &EncounterTransaction,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<EmrUuid> {
    let encounter_type = wire.encounter_type_uuid.ok_or_else(|| {
        EmrError::Validation("a new encounter requires an encounter type".into())
    })?;
    records.encounter_types.require(&encounter_type)?;
    let at = wire.encounter_date_time.unwrap_or(now);
    let location = wire
        .location_uuid
        .or(cfg.properties().visits.default_location);

    let visit = ensure_visit(
        cfg,
        records,
        wire.patient_uuid,
        VisitRequest {
            visit: wire.visit_uuid,
            visit_type: wire.visit_type_uuid,
            location,
        },
        at,
        auditor,
        now,
    )?;

    let encounter = Encounter {
        uuid: wire.encounter_uuid.unwrap_or_default(),
        patient: wire.patient_uuid,
        visit: Some(visit),
        encounter_type,
        location,
        encounter_datetime: at,
        providers: wire
            .providers
            .iter()
            .map(|p| EncounterProvider {
                provider: p.uuid,
                role: p.encounter_role.clone(),
            })
            .collect(),
        voided: None,
        audit: AuditInfo::created(auditor, now),
    };
    let uuid = encounter.uuid;
    tracing::info!(encounter = %uuid, visit = %visit, "created encounter");
    records.encounters.insert(encounter);
    Ok(uuid)
}

fn update_encounter(
    records: &mut Records,
    uuid: EmrUuid,
    wire: &EncounterTransaction,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<EmrUuid> {
    let encounter = records.encounters.require_mut(&uuid)?;
    if encounter.patient != wire.patient_uuid {
        return Err(EmrError::InvalidArgument(format!(
            "encounter {uuid} belongs to another patient"
        )));
    }
    if encounter.voided.is_some() {
        return Err(EmrError::InvalidState(format!("encounter {uuid} is voided")));
    }
    if let Some(location) = wire.location_uuid {
        encounter.location = Some(location);
    }
    if let Some(at) = wire.encounter_date_time {
        encounter.encounter_datetime = at;
    }
    for provider in &wire.providers {
        if !encounter.providers.iter().any(|p| p.provider == provider.uuid) {
            encounter.providers.push(EncounterProvider {
                provider: provider.uuid,
                role: provider.encounter_role.clone(),
            });
        }
    }
    encounter.audit.touch(auditor, now);
    Ok(uuid)
}

/// Voids the live disposition of the encounter ahead of a new one.
fn replace_dispositions(
    cfg: &CoreConfig,
    records: &mut Records,
    ctx: &ObsContext<'_>,
) -> EmrResult<()> {
    let live: Vec<EmrUuid> = records
        .obs
        .values()
        .filter(|o| o.encounter == ctx.encounter && !o.is_voided() && is_disposition(cfg, o))
        .map(|o| o.uuid)
        .collect();
    if live.is_empty() {
        return Ok(());
    }
    let reason = NonEmptyText::new(DISPOSITION_REPLACED_VOID_REASON)?;
    for group in live {
        tracing::debug!(obs = %group, "replacing disposition");
        void_obs_tree(records, group, ctx.auditor, ctx.now, &reason)?;
    }
    Ok(())
}

fn to_wire(
    cfg: &CoreConfig,
    records: &Records,
    encounter: &Encounter,
    include_voided: bool,
) -> EncounterTransaction {
    let metadata = DiagnosisMetadata::new(cfg);
    let mut top_level: Vec<&Obs> = records
        .obs
        .values()
        .filter(|o| o.encounter == Some(encounter.uuid) && o.group.is_none())
        .filter(|o| include_voided || !o.is_voided())
        .collect();
    top_level.sort_by_key(|o| (o.obs_datetime, o.audit.date_created));

    let mut observations = Vec::new();
    let mut diagnoses = Vec::new();
    let mut disposition: Option<(&Obs, et::Disposition)> = None;
    for obs in top_level {
        if metadata.is_diagnosis(obs) {
            match metadata.to_wire(records, obs) {
                Ok(diagnosis) => diagnoses.push(diagnosis),
                Err(err) => {
                    tracing::warn!(obs = %obs.uuid, error = %err, "unreadable diagnosis group");
                }
            }
        } else if is_disposition(cfg, obs) {
            let Some(rendered) = disposition_to_wire(cfg, records, obs, include_voided) else {
                continue;
            };
            // a live disposition wins over voided ones, then the latest
            let key = |o: &Obs| (!o.is_voided(), o.obs_datetime, o.audit.date_created);
            let replace = disposition
                .as_ref()
                .map_or(true, |(current, _)| key(obs) >= key(current));
            if replace {
                disposition = Some((obs, rendered));
            }
        } else {
            observations.push(obs_to_wire(records, obs, include_voided));
        }
    }

    let mut orders: Vec<_> = records
        .orders
        .values()
        .filter(|o| o.encounter == encounter.uuid)
        .filter(|o| include_voided || o.voided.is_none())
        .collect();
    orders.sort_by(|a, b| {
        a.date_activated.cmp(&b.date_activated).then(
            a.sort_weight
                .unwrap_or(f64::MAX)
                .total_cmp(&b.sort_weight.unwrap_or(f64::MAX)),
        )
    });

    EncounterTransaction {
        encounter_uuid: Some(encounter.uuid),
        visit_uuid: encounter.visit,
        patient_uuid: encounter.patient,
        encounter_type_uuid: Some(encounter.encounter_type),
        visit_type_uuid: encounter
            .visit
            .and_then(|v| records.visits.get(&v))
            .map(|v| v.visit_type),
        location_uuid: encounter.location,
        encounter_date_time: Some(encounter.encounter_datetime),
        providers: encounter
            .providers
            .iter()
            .map(|p| et::Provider {
                uuid: p.provider,
                name: records.providers.get(&p.provider).map(|r| r.name.to_string()),
                encounter_role: p.role.clone(),
            })
            .collect(),
        observations,
        diagnoses,
        disposition: disposition.map(|(_, rendered)| rendered),
        drug_orders: orders
            .iter()
            .filter_map(|o| drug_order_to_wire(records, o))
            .collect(),
        test_orders: orders
            .iter()
            .filter_map(|o| test_order_to_wire(records, o))
            .collect(),
        adt_action: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{fixture, Fixture};
    use chrono::Duration;
    use encounter_transaction::{
        Certainty, ConceptRef, DiagnosisOrder, DosingInstructions, DrugOrder, DrugRef,
        Observation, OrderGroupRef, OrderHeader, TestOrder,
    };

    fn service(f: &Fixture) -> EncounterTransactionService<MemoryStore> {
        EncounterTransactionService::new(f.cfg.clone(), f.store.clone())
    }

    fn diagnosis(
        coded: Option<EmrUuid>,
        free_text: Option<&str>,
        certainty: Certainty,
        order: DiagnosisOrder,
    ) -> et::Diagnosis {
        et::Diagnosis {
            existing_obs: None,
            coded_answer: coded.map(ConceptRef::by_uuid),
            free_text_answer: free_text.map(str::to_string),
            certainty,
            order,
            diagnosis_date_time: None,
            voided: false,
            void_reason: None,
            comments: None,
        }
    }

    fn disposition(code: &str) -> et::Disposition {
        et::Disposition {
            code: code.into(),
            existing_obs: None,
            voided: false,
            void_reason: None,
            disposition_date_time: None,
            additional_obs: vec![],
        }
    }

    fn full_transaction(f: &Fixture) -> EncounterTransaction {
        let mut et = EncounterTransaction::for_patient(f.ids.patient);
        et.encounter_type_uuid = Some(f.ids.consultation);
        et.providers = vec![et::Provider {
            uuid: f.ids.provider,
            name: None,
            encounter_role: Some("Clinician".into()),
        }];
        let mut vitals = Observation::new(ConceptRef::by_uuid(f.ids.vitals), None);
        vitals.group_members = vec![Observation::new(
            ConceptRef::by_uuid(f.ids.weight),
            Some(et::ObsValue::Number(61.0)),
        )];
        et.observations = vec![
            Observation::new(
                ConceptRef::by_uuid(f.ids.notes),
                Some(et::ObsValue::Text("feels better".into())),
            ),
            vitals,
        ];
        et.diagnoses = vec![
            diagnosis(
                Some(f.ids.malaria),
                None,
                Certainty::Confirmed,
                DiagnosisOrder::Primary,
            ),
            diagnosis(
                None,
                Some("Odd rash"),
                Certainty::Presumed,
                DiagnosisOrder::Secondary,
            ),
        ];
        et.disposition = Some(disposition("ADMIT"));
        et.drug_orders = vec![DrugOrder {
            header: OrderHeader {
                order_group: Some(OrderGroupRef {
                    uuid: None,
                    order_set_uuid: Some(f.ids.malaria_pack),
                }),
                ..OrderHeader::default()
            },
            drug: Some(DrugRef {
                name: Some("Paracetamol 500mg".into()),
                ..DrugRef::default()
            }),
            dosing_instructions: DosingInstructions {
                dose: Some(500.0),
                dose_units: Some("mg".into()),
                frequency: Some("Twice a day".into()),
                ..DosingInstructions::default()
            },
            ..DrugOrder::default()
        }];
        et.test_orders = vec![TestOrder {
            header: OrderHeader::default(),
            concept: ConceptRef::by_uuid(f.ids.full_blood_count),
        }];
        et
    }

    fn counts(f: &Fixture) -> (usize, usize, usize, usize) {
        f.store
            .read(|r| {
                Ok((
                    r.encounters.len(),
                    r.visits.len(),
                    r.obs.len(),
                    r.orders.len(),
                ))
            })
            .unwrap()
    }

    #[test]
    fn saved_transaction_reads_back() {
        let f = fixture();
        let svc = service(&f);
        let saved = svc.save(&full_transaction(&f), &f.auditor()).unwrap();

        let encounter = saved.encounter_uuid.unwrap();
        assert!(saved.visit_uuid.is_some());
        assert_eq!(saved.visit_type_uuid, Some(f.ids.outpatient_visit));
        assert_eq!(saved.location_uuid, Some(f.ids.clinic));
        assert_eq!(saved.adt_action, Some(AdtAction::Admit));
        assert_eq!(saved.providers[0].name.as_deref(), Some("Dr Mensah"));

        assert_eq!(saved.observations.len(), 2);
        let vitals = saved
            .observations
            .iter()
            .find(|o| o.concept.uuid == Some(f.ids.vitals))
            .unwrap();
        assert_eq!(
            vitals.group_members[0].value,
            Some(et::ObsValue::Number(61.0))
        );

        assert_eq!(saved.diagnoses.len(), 2);
        let primary = saved
            .diagnoses
            .iter()
            .find(|d| d.order == DiagnosisOrder::Primary)
            .unwrap();
        assert_eq!(
            primary.coded_answer.as_ref().and_then(|c| c.uuid),
            Some(f.ids.malaria)
        );
        assert!(saved
            .diagnoses
            .iter()
            .any(|d| d.free_text_answer.as_deref() == Some("Odd rash")
                && d.certainty == Certainty::Presumed));

        assert_eq!(saved.disposition.as_ref().map(|d| d.code.as_str()), Some("ADMIT"));
        assert_eq!(saved.drug_orders.len(), 1);
        let group = saved.drug_orders[0].header.order_group.as_ref().unwrap();
        assert_eq!(group.order_set_uuid, Some(f.ids.malaria_pack));
        assert!(group.uuid.is_some());
        assert_eq!(saved.test_orders.len(), 1);
        assert_eq!(saved.test_orders[0].concept.uuid, Some(f.ids.full_blood_count));

        let mut read = svc.get(encounter, false).unwrap();
        assert!(read.adt_action.is_none());
        read.adt_action = saved.adt_action;
        assert_eq!(read, saved);
    }

    #[test]
    fn resubmission_updates_and_voids_in_place() {
        let f = fixture();
        let svc = service(&f);
        let auditor = f.auditor();
        let saved = svc.save(&full_transaction(&f), &auditor).unwrap();

        let mut edit = EncounterTransaction::for_patient(f.ids.patient);
        edit.encounter_uuid = saved.encounter_uuid;
        let mut rash = saved
            .diagnoses
            .iter()
            .find(|d| d.free_text_answer.is_some())
            .cloned()
            .unwrap();
        rash.voided = true;
        rash.void_reason = Some("entered in error".into());
        let mut notes = saved
            .observations
            .iter()
            .find(|o| o.concept.uuid == Some(f.ids.notes))
            .cloned()
            .unwrap();
        notes.value = Some(et::ObsValue::Text("much better".into()));
        edit.diagnoses = vec![rash];
        edit.observations = vec![notes];
        edit.disposition = Some(disposition("DISCHARGE"));

        let updated = svc.save(&edit, &auditor).unwrap();
        assert_eq!(updated.encounter_uuid, saved.encounter_uuid);
        assert_eq!(updated.visit_uuid, saved.visit_uuid);
        assert_eq!(updated.diagnoses.len(), 1);
        assert_eq!(updated.adt_action, Some(AdtAction::Discharge));
        assert_eq!(
            updated.disposition.as_ref().map(|d| d.code.as_str()),
            Some("DISCHARGE")
        );
        let notes = updated
            .observations
            .iter()
            .find(|o| o.concept.uuid == Some(f.ids.notes))
            .unwrap();
        assert_eq!(notes.value, Some(et::ObsValue::Text("much better".into())));

        let with_voided = svc.get(saved.encounter_uuid.unwrap(), true).unwrap();
        assert_eq!(with_voided.diagnoses.len(), 2);
        assert!(with_voided.diagnoses.iter().any(|d| d.voided));
    }

    #[test]
    fn failed_save_writes_nothing() {
        let f = fixture();
        let svc = service(&f);
        let before = counts(&f);

        let mut bad_drug = full_transaction(&f);
        bad_drug.drug_orders[0].drug = Some(DrugRef {
            name: Some("Unobtainium".into()),
            ..DrugRef::default()
        });
        assert!(matches!(
            svc.save(&bad_drug, &f.auditor()),
            Err(EmrError::InvalidDrug(_))
        ));

        let mut unreasoned = full_transaction(&f);
        unreasoned.diagnoses[0].voided = true;
        assert!(matches!(
            svc.save(&unreasoned, &f.auditor()),
            Err(EmrError::MissingVoidReason)
        ));
        assert_eq!(counts(&f), before);
    }

    #[test]
    fn rejects_unknown_patient_provider_and_missing_type() {
        let f = fixture();
        let svc = service(&f);

        let mut stranger = full_transaction(&f);
        stranger.patient_uuid = EmrUuid::new();
        assert!(matches!(
            svc.save(&stranger, &f.auditor()),
            Err(EmrError::NotFound {
                kind: "patient",
                ..
            })
        ));

        let mut ghost = full_transaction(&f);
        ghost.providers[0].uuid = EmrUuid::new();
        assert!(matches!(
            svc.save(&ghost, &f.auditor()),
            Err(EmrError::UnknownProvider(_))
        ));

        let mut untyped = full_transaction(&f);
        untyped.encounter_type_uuid = None;
        assert!(matches!(
            svc.save(&untyped, &f.auditor()),
            Err(EmrError::Validation(_))
        ));
    }

    #[test]
    fn find_lists_newest_first_within_the_visit() {
        let f = fixture();
        let svc = service(&f);
        let auditor = f.auditor();
        let start = Utc::now() - Duration::hours(3);

        let mut first = EncounterTransaction::for_patient(f.ids.patient);
        first.encounter_type_uuid = Some(f.ids.consultation);
        first.encounter_date_time = Some(start);
        let first = svc.save(&first, &auditor).unwrap();

        let mut second = EncounterTransaction::for_patient(f.ids.patient);
        second.encounter_type_uuid = Some(f.ids.consultation);
        second.encounter_date_time = Some(start + Duration::hours(1));
        let second = svc.save(&second, &auditor).unwrap();
        assert_eq!(second.visit_uuid, first.visit_uuid);

        let found = svc.find(f.ids.patient, first.visit_uuid, None).unwrap();
        let uuids: Vec<_> = found.iter().map(|t| t.encounter_uuid).collect();
        assert_eq!(uuids, vec![second.encounter_uuid, first.encounter_uuid]);
        assert!(svc
            .find(f.ids.other_patient, None, None)
            .unwrap()
            .is_empty());
    }
}
