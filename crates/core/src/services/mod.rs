//! Clinical services.
//!
//! Each service holds the shared [`CoreConfig`](crate::config::CoreConfig) (when it needs
//! configured concepts) and a store handle. Writes run inside one store transaction per call.

pub mod adt;
pub mod beds;
pub mod conditions;
pub mod diagnoses;
pub(crate) mod disposition;
pub mod encounter_transaction;
pub mod migration;
pub(crate) mod observations;
pub mod orders;
pub(crate) mod visits;

pub use adt::{AdtRequest, AdtService};
pub use beds::BedService;
pub use conditions::{ConditionHistory, ConditionInput, ConditionService};
pub use diagnoses::{DiagnosisInput, DiagnosisMetadata, DiagnosisService, ObsDiagnosis};
pub use encounter_transaction::EncounterTransactionService;
pub use migration::{DiagnosisMigrator, MigrationReport};
pub use orders::{OrderMapper, OrderService, OrderType};
