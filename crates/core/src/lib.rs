//! # EMR Core
//!
//! Core business logic for the EMR API.
//!
//! This crate contains the clinical domain model and the rules that govern it:
//! - Condition history versioning
//! - Obs-encoded and first-class diagnoses, and migration between the two
//! - Drug and test order mapping, with order groups keyed by order set
//! - Encounter transaction save and read
//! - Admission, discharge, transfer and bed assignment
//!
//! Records live behind the [`EmrStore`](store::EmrStore) seam: in memory, or as sharded JSON
//! files under `EMR_DATA_DIR`.
//!
//! **No API concerns**: Authentication and HTTP servers belong in `api-rest` or `api-shared`.

pub mod audit;
pub mod config;
pub mod constants;
pub mod dictionary;
pub mod error;
pub mod model;
pub mod properties;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{AuditInfo, Auditor, VoidInfo};
pub use config::{CoreConfig, StoreKind};
pub use dictionary::{Dictionary, SeedReport};
pub use error::{EmrError, EmrResult};
pub use properties::EmrApiProperties;
pub use services::{
    AdtRequest, AdtService, BedService, ConditionHistory, ConditionInput, ConditionService,
    DiagnosisInput, DiagnosisMetadata, DiagnosisMigrator, DiagnosisService,
    EncounterTransactionService, MigrationReport, OrderMapper, OrderService, OrderType,
};
pub use store::{AnyStore, EmrStore, FileStore, MemoryStore};

pub use emr_types::NonEmptyText;
pub use emr_uuid::EmrUuid;
pub use encounter_transaction;
