//! Visit lookup and creation.

use crate::audit::{AuditInfo, Auditor};
use crate::config::CoreConfig;
use crate::error::{EmrError, EmrResult};
use crate::model::Visit;
use crate::store::Records;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;

/// The patient's visit that is active at `at`, latest start first.
pub(crate) fn active_visit(
    records: &Records,
    patient: EmrUuid,
    at: DateTime<Utc>,
) -> Option<&Visit> {
    records
        .visits
        .values()
        .filter(|v| v.patient == patient && v.is_active_at(at))
        .max_by_key(|v| v.start)
}

/// What an encounter asks of its visit.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct VisitRequest {
    pub visit: Option<EmrUuid>,
    pub visit_type: Option<EmrUuid>,
    pub location: Option<EmrUuid>,
}

/// Resolves the visit an encounter belongs to, creating one when the patient has none active.
///
/// An explicit visit must exist and belong to the patient. A new visit uses the requested visit
/// type, falling back to the configured default, and starts at `at`.
pub(crate) fn ensure_visit(
    cfg: &CoreConfig,
    records: &mut Records,
    patient: EmrUuid,
    request: VisitRequest,
    at: DateTime<Utc>,
    auditor: &Auditor,
    now: DateTime<Utc>,
) -> EmrResult<EmrUuid> {
    if let Some(uuid) = request.visit {
        let visit = records.visits.require(&uuid)?;
        if visit.patient != patient {
            return Err(EmrError::InvalidArgument(format!(
                "visit {uuid} belongs to another patient"
            )));
        }
        if visit.voided.is_some() {
            return Err(EmrError::InvalidState(format!("visit {uuid} is voided")));
        }
        return Ok(uuid);
    }
    if let Some(visit) = active_visit(records, patient, at) {
        return Ok(visit.uuid);
    }

    let defaults = &cfg.properties().visits;
    let visit_type = request.visit_type.unwrap_or(defaults.default_visit_type);
    records.visit_types.require(&visit_type)?;
    let location = request.location.or(defaults.default_location);
    if let Some(location) = location {
        records.locations.require(&location)?;
    }

    let visit = Visit {
        uuid: EmrUuid::new(),
        patient,
        visit_type,
        location,
        start: at,
        stop: None,
        voided: None,
        audit: AuditInfo::created(auditor, now),
    };
    let uuid = visit.uuid;
    tracing::info!(visit = %uuid, patient = %patient, "started visit");
    records.visits.insert(visit);
    Ok(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EmrStore;
    use crate::test_support::fixture;
    use chrono::Duration;

    #[test]
    fn reuses_active_visit_and_creates_one_otherwise() {
        let f = fixture();
        let auditor = f.auditor();
        let now = Utc::now();
        f.store
            .transaction(|records| {
                let first = ensure_visit(
                    &f.cfg,
                    records,
                    f.ids.patient,
                    VisitRequest::default(),
                    now,
                    &auditor,
                    now,
                )?;
                let visit = records.visits.require(&first)?;
                assert_eq!(visit.visit_type, f.ids.outpatient_visit);
                assert_eq!(visit.location, Some(f.ids.clinic));

                let again = ensure_visit(
                    &f.cfg,
                    records,
                    f.ids.patient,
                    VisitRequest::default(),
                    now + Duration::minutes(5),
                    &auditor,
                    now,
                )?;
                assert_eq!(again, first);

                records.visits.require_mut(&first)?.stop = Some(now + Duration::minutes(10));
                let third = ensure_visit(
                    &f.cfg,
                    records,
                    f.ids.patient,
                    VisitRequest::default(),
                    now + Duration::hours(1),
                    &auditor,
                    now,
                )?;
                assert_ne!(third, first);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn explicit_visit_must_belong_to_patient() {
        let f = fixture();
        let auditor = f.auditor();
        let now = Utc::now();
        let result = f.store.transaction(|records| {
            let visit = ensure_visit(
                &f.cfg,
                records,
                f.ids.patient,
                VisitRequest::default(),
                now,
                &auditor,
                now,
            )?;
            ensure_visit(
                &f.cfg,
                records,
                f.ids.other_patient,
                VisitRequest {
                    visit: Some(visit),
                    ..VisitRequest::default()
                },
                now,
                &auditor,
                now,
            )
        });
        assert!(matches!(result, Err(EmrError::InvalidArgument(_))));
    }

    #[test]
    fn unknown_visit_type_is_not_found() {
        let f = fixture();
        let auditor = f.auditor();
        let now = Utc::now();
        let result = f.store.transaction(|records| {
            ensure_visit(
                &f.cfg,
                records,
                f.ids.patient,
                VisitRequest {
                    visit_type: Some(EmrUuid::new()),
                    ..VisitRequest::default()
                },
                now,
                &auditor,
                now,
            )
        });
        assert!(matches!(
            result,
            Err(EmrError::NotFound {
                kind: "visit type",
                ..
            })
        ));
    }
}
