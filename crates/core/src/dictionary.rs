//! Reference-data seed files.
//!
//! A dictionary is a YAML document listing the concepts, drugs, order sets, providers,
//! locations, types, beds and patients a store should know about. Seeding is additive: rows
//! already present (by uuid) are replaced.

use crate::error::{EmrError, EmrResult};
use crate::model::{
    Bed, Concept, Drug, EncounterType, Location, OrderFrequency, OrderSet, Patient, Provider,
    VisitType,
};
use crate::store::{EmrStore, Records};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dictionary {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub drugs: Vec<Drug>,
    #[serde(default)]
    pub order_frequencies: Vec<OrderFrequency>,
    #[serde(default)]
    pub order_sets: Vec<OrderSet>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub encounter_types: Vec<EncounterType>,
    #[serde(default)]
    pub visit_types: Vec<VisitType>,
    #[serde(default)]
    pub beds: Vec<Bed>,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

/// Row counts written by [`Dictionary::seed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub reference_rows: usize,
    pub patients: usize,
    pub beds: usize,
}

impl Dictionary {
    /// # Errors
    ///
    /// Returns [`EmrError::ConfigSchema`] naming the failing field path.
    pub fn parse(yaml_text: &str) -> EmrResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            let path = err.path().to_string();
            let source = err.into_inner();
            EmrError::ConfigSchema(format!("dictionary mismatch at {path}: {source}"))
        })
    }

    pub fn load(path: &Path) -> EmrResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EmrError::ConfigRead)?;
        Self::parse(&text)
    }

    /// Writes every row into `records`.
    pub fn apply(self, records: &mut Records) -> SeedReport {
        let reference_rows = self.concepts.len()
            + self.drugs.len()
            + self.order_frequencies.len()
            + self.order_sets.len()
            + self.providers.len()
            + self.locations.len()
            + self.encounter_types.len()
            + self.visit_types.len();
        let report = SeedReport {
            reference_rows,
            patients: self.patients.len(),
            beds: self.beds.len(),
        };

        self.concepts.into_iter().for_each(|r| records.concepts.insert(r));
        self.drugs.into_iter().for_each(|r| records.drugs.insert(r));
        self.order_frequencies
            .into_iter()
            .for_each(|r| records.order_frequencies.insert(r));
        self.order_sets
            .into_iter()
            .for_each(|r| records.order_sets.insert(r));
        self.providers
            .into_iter()
            .for_each(|r| records.providers.insert(r));
        self.locations
            .into_iter()
            .for_each(|r| records.locations.insert(r));
        self.encounter_types
            .into_iter()
            .for_each(|r| records.encounter_types.insert(r));
        self.visit_types
            .into_iter()
            .for_each(|r| records.visit_types.insert(r));
        self.beds.into_iter().for_each(|r| records.beds.insert(r));
        self.patients
            .into_iter()
            .for_each(|r| records.patients.insert(r));

        report
    }

    /// Seeds `store` in one transaction.
    pub fn seed<S: EmrStore>(self, store: &S) -> EmrResult<SeedReport> {
        let report = store.transaction(|records| Ok(self.apply(records)))?;
        tracing::info!(
            reference_rows = report.reference_rows,
            patients = report.patients,
            beds = report.beds,
            "seeded dictionary"
        );
        Ok(report)
    }
}
