//! Bed assignment.
//!
//! A patient holds at most one open assignment. An occupied bed is released when its assignment
//! closes.

use crate::error::{EmrError, EmrResult};
use crate::model::{BedAssignment, BedStatus};
use crate::store::{EmrStore, Records};
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use std::sync::Arc;

pub(crate) fn open_assignment(records: &Records, patient: EmrUuid) -> Option<&BedAssignment> {
    records
        .bed_assignments
        .values()
        .find(|a| a.patient == patient && a.is_open())
}

/// Puts `patient` in `bed`, closing the patient's current assignment first.
pub(crate) fn assign_in(
    records: &mut Records,
    patient: EmrUuid,
    encounter: EmrUuid,
    bed: EmrUuid,
    at: DateTime<Utc>,
) -> EmrResult<BedAssignment> {
    records.patients.require(&patient)?;
    if records.encounters.require(&encounter)?.patient != patient {
        return Err(EmrError::InvalidArgument(format!(
            "encounter {encounter} belongs to another patient"
        )));
    }
    records.beds.require(&bed)?;
    unassign_in(records, patient, at)?;

    let stored = records.beds.require_mut(&bed)?;
    if stored.status != BedStatus::Available {
        return Err(EmrError::InvalidState(format!(
            "bed {} is occupied",
            stored.bed_number
        )));
    }
    stored.status = BedStatus::Occupied;

    let assignment = BedAssignment {
        uuid: EmrUuid::new(),
        patient,
        encounter,
        bed,
        start: at,
        end: None,
    };
    tracing::info!(patient = %patient, bed = %bed, "assigned bed");
    records.bed_assignments.insert(assignment.clone());
    Ok(assignment)
}

/// Closes the patient's open assignment, if any, and frees its bed.
pub(crate) fn unassign_in(
    records: &mut Records,
    patient: EmrUuid,
    at: DateTime<Utc>,
) -> EmrResult<Option<BedAssignment>> {
    let Some(open) = open_assignment(records, patient).map(|a| a.uuid) else {
        return Ok(None);
    };
    let assignment = records.bed_assignments.require_mut(&open)?;
    assignment.end = Some(at.max(assignment.start));
    let closed = assignment.clone();
    records.beds.require_mut(&closed.bed)?.status = BedStatus::Available;
    tracing::info!(patient = %patient, bed = %closed.bed, "released bed");
    Ok(Some(closed))
}

pub struct BedService<S> {
    store: Arc<S>,
}

impl<S: EmrStore> BedService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns [`EmrError::InvalidState`] when the bed is held by someone else.
    pub fn assign(
        &self,
        patient: EmrUuid,
        encounter: EmrUuid,
        bed: EmrUuid,
    ) -> EmrResult<BedAssignment> {
        let now = Utc::now();
        self.store
            .transaction(|records| assign_in(records, patient, encounter, bed, now))
    }

    pub fn unassign(&self, patient: EmrUuid) -> EmrResult<Option<BedAssignment>> {
        let now = Utc::now();
        self.store.transaction(|records| {
            records.patients.require(&patient)?;
            unassign_in(records, patient, now)
        })
    }

    pub fn bed_for(&self, patient: EmrUuid) -> EmrResult<Option<BedAssignment>> {
        self.store.read(|records| {
            records.patients.require(&patient)?;
            Ok(open_assignment(records, patient).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{fixture, Fixture};

    fn service(f: &Fixture) -> BedService<MemoryStore> {
        BedService::new(f.store.clone())
    }

    fn status(f: &Fixture, bed: EmrUuid) -> BedStatus {
        f.store
            .read(|r| Ok(r.beds.require(&bed)?.status))
            .unwrap()
    }

    #[test]
    fn assignment_occupies_and_release_frees() {
        let f = fixture();
        let svc = service(&f);
        let enc = f.encounter(f.ids.patient);

        let assignment = svc.assign(f.ids.patient, enc, f.ids.bed_a).unwrap();
        assert_eq!(status(&f, f.ids.bed_a), BedStatus::Occupied);
        assert_eq!(svc.bed_for(f.ids.patient).unwrap(), Some(assignment));

        let closed = svc.unassign(f.ids.patient).unwrap().unwrap();
        assert!(closed.end.is_some());
        assert_eq!(status(&f, f.ids.bed_a), BedStatus::Available);
        assert_eq!(svc.bed_for(f.ids.patient).unwrap(), None);
        assert_eq!(svc.unassign(f.ids.patient).unwrap(), None);
    }

    #[test]
    fn occupied_bed_cannot_be_taken() {
        let f = fixture();
        let svc = service(&f);
        let first = f.encounter(f.ids.patient);
        let second = f.encounter(f.ids.other_patient);

        svc.assign(f.ids.patient, first, f.ids.bed_a).unwrap();
        assert!(matches!(
            svc.assign(f.ids.other_patient, second, f.ids.bed_a),
            Err(EmrError::InvalidState(_))
        ));
        assert_eq!(svc.bed_for(f.ids.other_patient).unwrap(), None);
    }

    #[test]
    fn reassignment_moves_the_patient() {
        let f = fixture();
        let svc = service(&f);
        let enc = f.encounter(f.ids.patient);

        svc.assign(f.ids.patient, enc, f.ids.bed_a).unwrap();
        svc.assign(f.ids.patient, enc, f.ids.bed_b).unwrap();
        assert_eq!(status(&f, f.ids.bed_a), BedStatus::Available);
        assert_eq!(status(&f, f.ids.bed_b), BedStatus::Occupied);
        assert_eq!(
            svc.bed_for(f.ids.patient).unwrap().map(|a| a.bed),
            Some(f.ids.bed_b)
        );
    }

    #[test]
    fn encounter_must_belong_to_patient() {
        let f = fixture();
        let enc = f.encounter(f.ids.other_patient);
        assert!(matches!(
            service(&f).assign(f.ids.patient, enc, f.ids.bed_a),
            Err(EmrError::InvalidArgument(_))
        ));
    }
}
