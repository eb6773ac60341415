//! Encounter Transaction wire/boundary support.
//!
//! The encounter transaction is the single over-the-wire contract of the EMR API: one clinical
//! encounter submission carrying observations, diagnoses, a disposition and orders.
//!
//! This crate provides:
//! - the JSON wire model ([`EncounterTransaction`] and its nested types),
//! - public clinical code enums shared with the core domain model ([`codes`]),
//! - strict parsing that reports the failing field path, and rendering.
//!
//! It performs no lookups: resolving UUIDs against reference data is the core crate's job.

pub mod codes;
pub mod orders;
pub mod transaction;

pub use codes::{
    AdtAction, CareSetting, Certainty, ConditionStatus, DiagnosisOrder, OrderAction, Urgency,
};
pub use orders::{DosingInstructions, DrugOrder, DrugRef, OrderGroupRef, OrderHeader, TestOrder};
pub use transaction::{
    ConceptRef, Diagnosis, Disposition, EncounterTransaction, ObsValue, Observation, Provider,
};

pub use emr_uuid::EmrUuid;

/// Errors returned by the `encounter-transaction` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum EtError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid urgency: {0}")]
    InvalidUrgency(String),
}

/// Type alias for Results that can fail with an [`EtError`].
pub type EtResult<T> = Result<T, EtError>;
