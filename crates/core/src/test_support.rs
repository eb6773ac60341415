//! Shared fixtures for service tests.

use crate::audit::Auditor;
use crate::config::{CoreConfig, StoreKind};
use crate::dictionary::Dictionary;
use crate::model::{
    Bed, BedStatus, Concept, ConceptDatatype, Drug, EncounterType, Location, OrderFrequency,
    OrderSet, OrderSetMember, Patient, Provider, VisitType,
};
use crate::properties::{
    AdtTypes, ConditionConcepts, DiagnosisConcepts, DispositionConcepts, DispositionOption,
    EmrApiProperties, VisitDefaults,
};
use crate::store::{EmrStore, MemoryStore};
use crate::NonEmptyText;
use emr_uuid::EmrUuid;
use encounter_transaction::AdtAction;
use std::path::PathBuf;
use std::sync::Arc;

/// Uuids of every row the fixture seeds.
#[derive(Clone, Debug)]
pub(crate) struct Ids {
    pub patient: EmrUuid,
    pub other_patient: EmrUuid,
    pub provider: EmrUuid,
    pub clinic: EmrUuid,
    pub ward: EmrUuid,
    pub consultation: EmrUuid,
    pub outpatient_visit: EmrUuid,
    pub malaria: EmrUuid,
    pub fever: EmrUuid,
    pub cured: EmrUuid,
    pub weight: EmrUuid,
    pub vitals: EmrUuid,
    pub notes: EmrUuid,
    pub paracetamol_concept: EmrUuid,
    pub paracetamol: EmrUuid,
    pub amoxicillin_concept: EmrUuid,
    pub amoxicillin: EmrUuid,
    pub twice_daily: EmrUuid,
    pub mg: EmrUuid,
    pub oral: EmrUuid,
    pub days: EmrUuid,
    pub full_blood_count: EmrUuid,
    pub malaria_pack: EmrUuid,
    pub bed_a: EmrUuid,
    pub bed_b: EmrUuid,
    pub admit_answer: EmrUuid,
    pub discharge_answer: EmrUuid,
    pub follow_up_answer: EmrUuid,
}

pub(crate) struct Fixture {
    pub cfg: Arc<CoreConfig>,
    pub store: Arc<MemoryStore>,
    pub ids: Ids,
}

impl Fixture {
    pub fn auditor(&self) -> Auditor {
        Auditor::new(EmrUuid::new(), "clinician").unwrap()
    }
}

fn concept(uuid: EmrUuid, name: &str, datatype: ConceptDatatype, class: &str) -> Concept {
    Concept {
        uuid,
        name: NonEmptyText::new(name).unwrap(),
        datatype,
        concept_class: class.into(),
        is_set: false,
        set_members: vec![],
        answers: vec![],
        units: None,
        retired: false,
    }
}

fn text(s: &str) -> NonEmptyText {
    NonEmptyText::new(s).unwrap()
}

pub(crate) fn fixture() -> Fixture {
    let n = EmrUuid::new;
    let ids = Ids {
        patient: n(),
        other_patient: n(),
        provider: n(),
        clinic: n(),
        ward: n(),
        consultation: n(),
        outpatient_visit: n(),
        malaria: n(),
        fever: n(),
        cured: n(),
        weight: n(),
        vitals: n(),
        notes: n(),
        paracetamol_concept: n(),
        paracetamol: n(),
        amoxicillin_concept: n(),
        amoxicillin: n(),
        twice_daily: n(),
        mg: n(),
        oral: n(),
        days: n(),
        full_blood_count: n(),
        malaria_pack: n(),
        bed_a: n(),
        bed_b: n(),
        admit_answer: n(),
        discharge_answer: n(),
        follow_up_answer: n(),
    };

    let properties = EmrApiProperties {
        diagnosis: DiagnosisConcepts {
            set: n(),
            certainty: n(),
            order: n(),
            coded: n(),
            non_coded: n(),
            confirmed: n(),
            presumed: n(),
            primary: n(),
            secondary: n(),
        },
        disposition: DispositionConcepts {
            set: n(),
            concept: n(),
            options: vec![
                DispositionOption {
                    code: "ADMIT".into(),
                    answer: ids.admit_answer,
                    adt_action: Some(AdtAction::Admit),
                },
                DispositionOption {
                    code: "DISCHARGE".into(),
                    answer: ids.discharge_answer,
                    adt_action: Some(AdtAction::Discharge),
                },
                DispositionOption {
                    code: "FOLLOW_UP".into(),
                    answer: ids.follow_up_answer,
                    adt_action: None,
                },
            ],
        },
        conditions: ConditionConcepts {
            non_coded: n(),
            end_reasons: n(),
        },
        adt: AdtTypes {
            admission_encounter_type: n(),
            discharge_encounter_type: n(),
            transfer_encounter_type: n(),
        },
        visits: VisitDefaults {
            default_visit_type: ids.outpatient_visit,
            default_location: Some(ids.clinic),
        },
    };

    use ConceptDatatype::{Coded, NotApplicable, Numeric, Text};
    let d = &properties.diagnosis;
    let mut concepts = vec![
        concept(ids.malaria, "Malaria", NotApplicable, "Diagnosis"),
        concept(ids.fever, "Fever", NotApplicable, "Diagnosis"),
        concept(ids.cured, "Cured", NotApplicable, "Misc"),
        concept(ids.weight, "Weight", Numeric, "Finding"),
        concept(ids.notes, "Clinical notes", Text, "Misc"),
        concept(ids.paracetamol_concept, "Paracetamol", NotApplicable, "Drug"),
        concept(ids.amoxicillin_concept, "Amoxicillin", NotApplicable, "Drug"),
        concept(n(), "Twice a day", NotApplicable, "Frequency"),
        concept(ids.mg, "mg", NotApplicable, "Units of Measure"),
        concept(ids.oral, "Oral", NotApplicable, "Route"),
        concept(ids.days, "Days", NotApplicable, "Units of Measure"),
        concept(ids.full_blood_count, "Full blood count", NotApplicable, "Test"),
        concept(d.certainty, "Diagnosis certainty", Coded, "Question"),
        concept(d.order, "Diagnosis order", Coded, "Question"),
        concept(d.coded, "Coded diagnosis", Coded, "Question"),
        concept(d.non_coded, "Non-coded diagnosis", Text, "Question"),
        concept(d.confirmed, "Confirmed", NotApplicable, "Misc"),
        concept(d.presumed, "Presumed", NotApplicable, "Misc"),
        concept(d.primary, "Primary", NotApplicable, "Misc"),
        concept(d.secondary, "Secondary", NotApplicable, "Misc"),
        concept(
            properties.disposition.concept,
            "Disposition",
            Coded,
            "Question",
        ),
        concept(ids.admit_answer, "Admit", NotApplicable, "Misc"),
        concept(ids.discharge_answer, "Discharge", NotApplicable, "Misc"),
        concept(ids.follow_up_answer, "Follow up", NotApplicable, "Misc"),
        concept(
            properties.conditions.non_coded,
            "Non-coded condition",
            NotApplicable,
            "Misc",
        ),
    ];
    let frequency_concept = concepts[7].uuid;

    let mut diagnosis_set = concept(d.set, "Visit diagnoses", NotApplicable, "ConvSet");
    diagnosis_set.is_set = true;
    diagnosis_set.set_members = vec![d.coded, d.non_coded, d.certainty, d.order];
    let mut disposition_set = concept(
        properties.disposition.set,
        "Disposition construct",
        NotApplicable,
        "ConvSet",
    );
    disposition_set.is_set = true;
    disposition_set.set_members = vec![properties.disposition.concept];
    let mut end_reasons = concept(
        properties.conditions.end_reasons,
        "Condition end reasons",
        NotApplicable,
        "ConvSet",
    );
    end_reasons.is_set = true;
    end_reasons.set_members = vec![ids.cured];
    let mut vitals = concept(ids.vitals, "Vitals", NotApplicable, "ConvSet");
    vitals.is_set = true;
    vitals.set_members = vec![ids.weight];
    concepts.extend([diagnosis_set, disposition_set, end_reasons, vitals]);

    let a = &properties.adt;
    let dictionary = Dictionary {
        concepts,
        drugs: vec![
            Drug {
                uuid: ids.paracetamol,
                name: text("Paracetamol 500mg"),
                concept: ids.paracetamol_concept,
                dosage_form: None,
                retired: false,
            },
            Drug {
                uuid: ids.amoxicillin,
                name: text("Amoxicillin 250mg"),
                concept: ids.amoxicillin_concept,
                dosage_form: None,
                retired: false,
            },
        ],
        order_frequencies: vec![OrderFrequency {
            uuid: ids.twice_daily,
            concept: frequency_concept,
            frequency_per_day: Some(2.0),
        }],
        order_sets: vec![OrderSet {
            uuid: ids.malaria_pack,
            name: text("Malaria pack"),
            members: vec![
                OrderSetMember {
                    concept: ids.paracetamol_concept,
                    drug: Some(ids.paracetamol),
                    sort_weight: 2.0,
                },
                OrderSetMember {
                    concept: ids.amoxicillin_concept,
                    drug: Some(ids.amoxicillin),
                    sort_weight: 1.0,
                },
            ],
        }],
        providers: vec![Provider {
            uuid: ids.provider,
            name: text("Dr Mensah"),
        }],
        locations: vec![
            Location {
                uuid: ids.clinic,
                name: text("Outpatient clinic"),
                parent: None,
            },
            Location {
                uuid: ids.ward,
                name: text("Ward 1"),
                parent: None,
            },
        ],
        encounter_types: vec![
            EncounterType {
                uuid: ids.consultation,
                name: text("Consultation"),
            },
            EncounterType {
                uuid: a.admission_encounter_type,
                name: text("Admission"),
            },
            EncounterType {
                uuid: a.discharge_encounter_type,
                name: text("Discharge"),
            },
            EncounterType {
                uuid: a.transfer_encounter_type,
                name: text("Transfer"),
            },
        ],
        visit_types: vec![VisitType {
            uuid: ids.outpatient_visit,
            name: text("Outpatient"),
        }],
        beds: vec![
            Bed {
                uuid: ids.bed_a,
                bed_number: "A1".into(),
                ward: ids.ward,
                status: BedStatus::Available,
            },
            Bed {
                uuid: ids.bed_b,
                bed_number: "A2".into(),
                ward: ids.ward,
                status: BedStatus::Available,
            },
        ],
        patients: vec![
            Patient {
                uuid: ids.patient,
                identifier: text("MRN-100"),
                given_name: text("Ama"),
                family_name: text("Owusu"),
                voided: None,
            },
            Patient {
                uuid: ids.other_patient,
                identifier: text("MRN-200"),
                given_name: text("Kofi"),
                family_name: text("Boateng"),
                voided: None,
            },
        ],
    };

    let store = Arc::new(MemoryStore::new());
    dictionary.seed(store.as_ref()).unwrap();
    store.read(|records| properties.verify(records)).unwrap();

    let cfg = Arc::new(CoreConfig::new(
        PathBuf::from("unused"),
        StoreKind::Memory,
        properties,
    ));
    Fixture { cfg, store, ids }
}

impl Fixture {
    /// Inserts a bare consultation encounter for `patient`.
    pub fn encounter(&self, patient: EmrUuid) -> EmrUuid {
        let now = chrono::Utc::now();
        let encounter = crate::model::Encounter {
            uuid: EmrUuid::new(),
            patient,
            visit: None,
            encounter_type: self.ids.consultation,
            location: Some(self.ids.clinic),
            encounter_datetime: now,
            providers: vec![crate::model::EncounterProvider {
                provider: self.ids.provider,
                role: None,
            }],
            voided: None,
            audit: crate::audit::AuditInfo::created(&self.auditor(), now),
        };
        let uuid = encounter.uuid;
        self.store
            .transaction(|records| {
                records.encounters.insert(encounter);
                Ok(())
            })
            .unwrap();
        uuid
    }
}
