//! Well-known concepts and types the EMR API is configured with.
//!
//! Loaded once at startup from YAML, for example:
//!
//! ```yaml
//! diagnosis:
//!   set: 0f8a7c3e-...
//!   certainty: ...
//!   order: ...
//!   coded: ...
//!   non_coded: ...
//!   confirmed: ...
//!   presumed: ...
//!   primary: ...
//!   secondary: ...
//! disposition:
//!   set: ...
//!   concept: ...
//!   options:
//!     - code: ADMIT
//!       answer: ...
//!       adt_action: ADMIT
//! conditions:
//!   non_coded: ...
//!   end_reasons: ...
//! adt:
//!   admission_encounter_type: ...
//!   discharge_encounter_type: ...
//!   transfer_encounter_type: ...
//! visits:
//!   default_visit_type: ...
//! ```

use crate::error::{EmrError, EmrResult};
use crate::store::Records;
use emr_uuid::EmrUuid;
use encounter_transaction::AdtAction;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosisConcepts {
    /// Concept of the obs group that encodes one diagnosis.
    pub set: EmrUuid,
    pub certainty: EmrUuid,
    pub order: EmrUuid,
    pub coded: EmrUuid,
    pub non_coded: EmrUuid,
    pub confirmed: EmrUuid,
    pub presumed: EmrUuid,
    pub primary: EmrUuid,
    pub secondary: EmrUuid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispositionOption {
    pub code: String,
    pub answer: EmrUuid,
    #[serde(default)]
    pub adt_action: Option<AdtAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispositionConcepts {
    /// Concept of the disposition obs group.
    pub set: EmrUuid,
    /// Coded member holding the chosen disposition.
    pub concept: EmrUuid,
    #[serde(default)]
    pub options: Vec<DispositionOption>,
}

impl DispositionConcepts {
    pub fn by_code(&self, code: &str) -> Option<&DispositionOption> {
        self.options
            .iter()
            .find(|o| o.code.eq_ignore_ascii_case(code.trim()))
    }

    pub fn by_answer(&self, answer: EmrUuid) -> Option<&DispositionOption> {
        self.options.iter().find(|o| o.answer == answer)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConcepts {
    /// Sentinel concept marking a free-text condition.
    pub non_coded: EmrUuid,
    /// Concept set whose members are valid end reasons.
    pub end_reasons: EmrUuid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdtTypes {
    pub admission_encounter_type: EmrUuid,
    pub discharge_encounter_type: EmrUuid,
    pub transfer_encounter_type: EmrUuid,
}

impl AdtTypes {
    pub fn action_for(&self, encounter_type: EmrUuid) -> Option<AdtAction> {
        if encounter_type == self.admission_encounter_type {
            Some(AdtAction::Admit)
        } else if encounter_type == self.discharge_encounter_type {
            Some(AdtAction::Discharge)
        } else if encounter_type == self.transfer_encounter_type {
            Some(AdtAction::Transfer)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisitDefaults {
    pub default_visit_type: EmrUuid,
    #[serde(default)]
    pub default_location: Option<EmrUuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmrApiProperties {
    pub diagnosis: DiagnosisConcepts,
    pub disposition: DispositionConcepts,
    pub conditions: ConditionConcepts,
    pub adt: AdtTypes,
    pub visits: VisitDefaults,
}

impl EmrApiProperties {
    /// Parses properties from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`EmrError::ConfigSchema`] naming the failing field path.
    pub fn parse(yaml_text: &str) -> EmrResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            let path = err.path().to_string();
            let source = err.into_inner();
            EmrError::ConfigSchema(format!("properties mismatch at {path}: {source}"))
        })
    }

    pub fn load(path: &Path) -> EmrResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EmrError::ConfigRead)?;
        Self::parse(&text)
    }

    /// Checks that every configured uuid resolves in `records`.
    pub fn verify(&self, records: &Records) -> EmrResult<()> {
        let d = &self.diagnosis;
        let concepts = [
            ("diagnosis.set", d.set),
            ("diagnosis.certainty", d.certainty),
            ("diagnosis.order", d.order),
            ("diagnosis.coded", d.coded),
            ("diagnosis.non_coded", d.non_coded),
            ("diagnosis.confirmed", d.confirmed),
            ("diagnosis.presumed", d.presumed),
            ("diagnosis.primary", d.primary),
            ("diagnosis.secondary", d.secondary),
            ("disposition.set", self.disposition.set),
            ("disposition.concept", self.disposition.concept),
            ("conditions.non_coded", self.conditions.non_coded),
            ("conditions.end_reasons", self.conditions.end_reasons),
        ];
        for (field, uuid) in concepts {
            if !records.concepts.contains(&uuid) {
                return Err(EmrError::ConfigSchema(format!(
                    "{field} refers to unknown concept {uuid}"
                )));
            }
        }
        for option in &self.disposition.options {
            if !records.concepts.contains(&option.answer) {
                return Err(EmrError::ConfigSchema(format!(
                    "disposition option {} refers to unknown concept {}",
                    option.code, option.answer
                )));
            }
        }
        let a = &self.adt;
        for (field, uuid) in [
            ("adt.admission_encounter_type", a.admission_encounter_type),
            ("adt.discharge_encounter_type", a.discharge_encounter_type),
            ("adt.transfer_encounter_type", a.transfer_encounter_type),
        ] {
            if !records.encounter_types.contains(&uuid) {
                return Err(EmrError::ConfigSchema(format!(
                    "{field} refers to unknown encounter type {uuid}"
                )));
            }
        }
        if !records.visit_types.contains(&self.visits.default_visit_type) {
            return Err(EmrError::ConfigSchema(format!(
                "visits.default_visit_type refers to unknown visit type {}",
                self.visits.default_visit_type
            )));
        }
        Ok(())
    }
}
