//! Domain model.
//!
//! Reference data (concepts, drugs, providers, ...) and clinical records (patients, visits,
//! encounters, observations, orders, conditions, diagnoses, beds). Records point at each other by
//! [`EmrUuid`]; the store resolves those references.

pub mod bed;
pub mod condition;
pub mod diagnosis;
pub mod encounter;
pub mod obs;
pub mod order;
pub mod patient;
pub mod reference;

pub use bed::{Bed, BedAssignment, BedStatus};
pub use condition::{CodedOrFreeText, Condition};
pub use diagnosis::Diagnosis;
pub use encounter::{Encounter, EncounterProvider};
pub use obs::{Obs, ObsValue};
pub use order::{DrugDetails, Order, OrderGroup, OrderKind};
pub use patient::{Patient, Visit};
pub use reference::{
    Concept, ConceptDatatype, Drug, EncounterType, Location, OrderFrequency, OrderSet,
    OrderSetMember, Provider, VisitType,
};

use emr_uuid::EmrUuid;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A row the store can keep.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Directory name used by the file-backed store.
    const KIND: &'static str;
    /// Singular name used in error messages.
    const LABEL: &'static str;

    fn uuid(&self) -> EmrUuid;
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal, $label:literal) => {
        impl $crate::model::Entity for $ty {
            const KIND: &'static str = $kind;
            const LABEL: &'static str = $label;

            fn uuid(&self) -> emr_uuid::EmrUuid {
                self.uuid
            }
        }
    };
}

pub(crate) use impl_entity;
