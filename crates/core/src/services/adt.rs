//! Admission, discharge and transfer.
//!
//! Each action writes an encounter of the configured ADT encounter type into the patient's
//! active visit. Whether a patient is admitted is read from the latest such encounter.

use super::beds::{assign_in, unassign_in};
use super::visits::{active_visit, ensure_visit, VisitRequest};
use crate::audit::{AuditInfo, Auditor};
use crate::config::CoreConfig;
use crate::error::{EmrError, EmrResult};
use crate::model::{Encounter, EncounterProvider};
use crate::store::{EmrStore, Records};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use encounter_transaction::AdtAction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Who moves where, when, and on whose authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdtRequest {
    pub patient: EmrUuid,
    pub location: EmrUuid,
    /// Defaults to now.
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    pub provider: EmrUuid,
    /// Ignored on discharge.
    #[serde(default)]
    pub bed: Option<EmrUuid>,
}

/// The latest non-voided ADT encounter of a visit.
fn latest_adt<'r>(
    cfg: &CoreConfig,
    records: &'r Records,
    visit: EmrUuid,
) -> Option<(&'r Encounter, AdtAction)> {
    let types = &cfg.properties().adt;
    records
        .encounters
        .values()
        .filter(|e| e.visit == Some(visit) && e.voided.is_none())
        .filter_map(|e| types.action_for(e.encounter_type).map(|action| (e, action)))
        .max_by_key(|(e, _)| (e.encounter_datetime, e.audit.date_created))
}

pub(crate) fn admitted_in(cfg: &CoreConfig, records: &Records, visit: EmrUuid) -> bool {
    matches!(
        latest_adt(cfg, records, visit),
        Some((_, AdtAction::Admit | AdtAction::Transfer))
    )
}

fn adt_in(
    cfg: &CoreConfig,
    records: &mut Records,
    request: &AdtRequest,
    action: AdtAction,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<Encounter> {
    let patient = request.patient;
    records.patients.require(&patient)?;
    records.locations.require(&request.location)?;
    if !records.providers.contains(&request.provider) {
        return Err(EmrError::UnknownProvider(request.provider.to_string()));
    }
    let at = request.datetime.unwrap_or(now);

    let visit = match action {
        AdtAction::Admit => {
            let visit = ensure_visit(
                cfg,
                records,
                patient,
                VisitRequest {
                    location: Some(request.location),
                    ..VisitRequest::default()
                },
                at,
                auditor,
                now,
            )?;
            if admitted_in(cfg, records, visit) {
                return Err(EmrError::InvalidState(format!(
                    "patient {patient} is already admitted"
                )));
            }
            visit
        }
        AdtAction::Discharge | AdtAction::Transfer => {
            let visit = active_visit(records, patient, at)
                .map(|v| v.uuid)
                .filter(|v| admitted_in(cfg, records, *v))
                .ok_or_else(|| {
                    EmrError::InvalidState(format!("patient {patient} is not admitted"))
                })?;
            if let Some((last, _)) = latest_adt(cfg, records, visit) {
                if at < last.encounter_datetime {
                    return Err(EmrError::Validation(format!(
                        "{action:?} at {at} precedes the last ADT encounter {}",
                        last.uuid
                    )));
                }
            }
            visit
        }
    };

    let types = &cfg.properties().adt;
    let encounter_type = match action {
        AdtAction::Admit => types.admission_encounter_type,
        AdtAction::Discharge => types.discharge_encounter_type,
        AdtAction::Transfer => types.transfer_encounter_type,
    };
    let encounter = Encounter {
        uuid: EmrUuid::new(),
        patient,
        visit: Some(visit),
        encounter_type,
        location: Some(request.location),
        encounter_datetime: at,
        providers: vec![EncounterProvider {
            provider: request.provider,
            role: None,
        }],
        voided: None,
        audit: AuditInfo::created(auditor, now),
    };
    records.encounters.insert(encounter.clone());

    match (action, request.bed) {
        (AdtAction::Discharge, _) => {
            unassign_in(records, patient, at)?;
        }
        (_, Some(bed)) => {
            assign_in(records, patient, encounter.uuid, bed, at)?;
        }
        (_, None) => {}
    }

    tracing::info!(
        patient = %patient,
        encounter = %encounter.uuid,
        visit = %visit,
        action = ?action,
        "recorded ADT encounter"
    );
    Ok(encounter)
}

pub struct AdtService<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
}

impl<S: EmrStore> AdtService<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self { cfg, store }
    }

    /// Admits a patient, starting a visit when none is active.
    ///
    /// # Errors
    ///
    /// Returns [`EmrError::InvalidState`] when the patient is already admitted or the bed is
    /// occupied.
    pub fn admit(&self, request: &AdtRequest, auditor: &Auditor) -> EmrResult<Encounter> {
        self.record(request, AdtAction::Admit, auditor)
    }

    /// Discharges an admitted patient and releases their bed.
    pub fn discharge(&self, request: &AdtRequest, auditor: &Auditor) -> EmrResult<Encounter> {
        self.record(request, AdtAction::Discharge, auditor)
    }

    /// Moves an admitted patient to another location, and bed when one is given.
    pub fn transfer(&self, request: &AdtRequest, auditor: &Auditor) -> EmrResult<Encounter> {
        self.record(request, AdtAction::Transfer, auditor)
    }

    pub fn is_admitted(&self, visit: EmrUuid) -> EmrResult<bool> {
        self.store.read(|records| {
            records.visits.require(&visit)?;
            Ok(admitted_in(&self.cfg, records, visit))
        })
    }

    fn record(
        &self,
        request: &AdtRequest,
        action: AdtAction,
        auditor: &Auditor,
    ) -> EmrResult<Encounter> {
        let now = Utc::now();
        self.store
            .transaction(|records| adt_in(&self.cfg, records, request, action, auditor, now))
    }
}
