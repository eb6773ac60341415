//! Reference data: the dictionary a clinical record is coded against.

use super::impl_entity;
use crate::NonEmptyText;
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptDatatype {
    Coded,
    Numeric,
    Text,
    Boolean,
    Datetime,
    NotApplicable,
}

impl ConceptDatatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptDatatype::Coded => "Coded",
            ConceptDatatype::Numeric => "Numeric",
            ConceptDatatype::Text => "Text",
            ConceptDatatype::Boolean => "Boolean",
            ConceptDatatype::Datetime => "Datetime",
            ConceptDatatype::NotApplicable => "N/A",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
    pub datatype: ConceptDatatype,
    #[serde(default = "default_concept_class")]
    pub concept_class: String,
    #[serde(default)]
    pub is_set: bool,
    /// Ordered members of a set (or of an obs-group construct).
    #[serde(default)]
    pub set_members: Vec<EmrUuid>,
    /// Allowed answers of a coded concept; empty means any concept is accepted.
    #[serde(default)]
    pub answers: Vec<EmrUuid>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub retired: bool,
}

fn default_concept_class() -> String {
    "Misc".to_string()
}

impl Concept {
    /// Case-insensitive comparison against the concept's name.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_str().eq_ignore_ascii_case(name.trim())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
    pub concept: EmrUuid,
    #[serde(default)]
    pub dosage_form: Option<EmrUuid>,
    #[serde(default)]
    pub retired: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderFrequency {
    pub uuid: EmrUuid,
    pub concept: EmrUuid,
    #[serde(default)]
    pub frequency_per_day: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSetMember {
    pub concept: EmrUuid,
    #[serde(default)]
    pub drug: Option<EmrUuid>,
    #[serde(default)]
    pub sort_weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSet {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
    #[serde(default)]
    pub members: Vec<OrderSetMember>,
}

impl OrderSet {
    /// Sort weight of the member matching a drug, else a concept.
    pub fn weight_for(&self, concept: EmrUuid, drug: Option<EmrUuid>) -> Option<f64> {
        drug.and_then(|d| self.members.iter().find(|m| m.drug == Some(d)))
            .or_else(|| self.members.iter().find(|m| m.concept == concept))
            .map(|m| m.sort_weight)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
    #[serde(default)]
    pub parent: Option<EmrUuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterType {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitType {
    pub uuid: EmrUuid,
    pub name: NonEmptyText,
}

impl_entity!(Concept, "concepts", "concept");
impl_entity!(Drug, "drugs", "drug");
impl_entity!(OrderFrequency, "order_frequencies", "order frequency");
impl_entity!(OrderSet, "order_sets", "order set");
impl_entity!(Provider, "providers", "provider");
impl_entity!(Location, "locations", "location");
impl_entity!(EncounterType, "encounter_types", "encounter type");
impl_entity!(VisitType, "visit_types", "visit type");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_set_weight_prefers_drug_match() {
        let concept = EmrUuid::new();
        let drug = EmrUuid::new();
        let set = OrderSet {
            uuid: EmrUuid::new(),
            name: NonEmptyText::new("Malaria pack").unwrap(),
            members: vec![
                OrderSetMember {
                    concept,
                    drug: None,
                    sort_weight: 5.0,
                },
                OrderSetMember {
                    concept,
                    drug: Some(drug),
                    sort_weight: 1.0,
                },
            ],
        };
        assert_eq!(set.weight_for(concept, Some(drug)), Some(1.0));
        assert_eq!(set.weight_for(concept, None), Some(5.0));
        assert_eq!(set.weight_for(EmrUuid::new(), None), None);
    }

    #[test]
    fn concept_name_match_ignores_case() {
        let c = Concept {
            uuid: EmrUuid::new(),
            name: NonEmptyText::new("Twice a day").unwrap(),
            datatype: ConceptDatatype::NotApplicable,
            concept_class: default_concept_class(),
            is_set: false,
            set_members: vec![],
            answers: vec![],
            units: None,
            retired: false,
        };
        assert!(c.is_named("twice A DAY "));
        assert!(!c.is_named("daily"));
    }
}
