//! Clinical code enums shared by the wire model and the core domain model.
//!
//! Wire spellings follow the upper-case codes clients already send (`CONFIRMED`, `PRIMARY`,
//! `ON_SCHEDULED_DATE`, ...).

use crate::EtError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How sure the clinician is about a diagnosis or condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Certainty {
    Confirmed,
    Presumed,
}

/// Primary or secondary diagnosis.
///
/// First-class diagnosis records store this as a numeric rank (primary = 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosisOrder {
    Primary,
    Secondary,
}

impl DiagnosisOrder {
    pub fn rank(self) -> u8 {
        match self {
            DiagnosisOrder::Primary => 1,
            DiagnosisOrder::Secondary => 2,
        }
    }

    /// Rank 1 is primary; every other rank is secondary.
    pub fn from_rank(rank: u8) -> Self {
        if rank == 1 {
            DiagnosisOrder::Primary
        } else {
            DiagnosisOrder::Secondary
        }
    }
}

/// Clinical status of a condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionStatus {
    #[default]
    Active,
    Inactive,
    HistoryOf,
}

/// What an order does to the patient's order list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    #[default]
    New,
    Revise,
    Discontinue,
    Renew,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CareSetting {
    #[default]
    Outpatient,
    Inpatient,
}

/// Order urgency.
///
/// The wire carries urgency as a free string so that an unknown value surfaces as a domain
/// error (`InvalidUrgency`) rather than a schema mismatch; use [`Urgency::from_str`] to read it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    #[default]
    Routine,
    Stat,
    OnScheduledDate,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Routine => "ROUTINE",
            Urgency::Stat => "STAT",
            Urgency::OnScheduledDate => "ON_SCHEDULED_DATE",
        }
    }
}

impl FromStr for Urgency {
    type Err = EtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ROUTINE" => Ok(Urgency::Routine),
            "STAT" => Ok(Urgency::Stat),
            "ON_SCHEDULED_DATE" => Ok(Urgency::OnScheduledDate),
            _ => Err(EtError::InvalidUrgency(s.to_string())),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission/discharge/transfer action a disposition points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdtAction {
    Admit,
    Discharge,
    Transfer,
}
