//! Audit metadata carried by clinical records.
//!
//! Every clinical record remembers who created it and when, who last changed it, and, once
//! retired from use, who voided it and why. Records are never hard-deleted.

use crate::constants::{SYSTEM_USERNAME, SYSTEM_USER_UUID};
use crate::error::{EmrError, EmrResult};
use crate::NonEmptyText;
use chrono::{DateTime, Utc};
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};

/// The user on whose behalf an operation runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auditor {
    pub uuid: EmrUuid,
    pub username: NonEmptyText,
}

impl Auditor {
    pub fn new(uuid: EmrUuid, username: impl AsRef<str>) -> EmrResult<Self> {
        Ok(Self {
            uuid,
            username: NonEmptyText::new(username)?,
        })
    }

    /// The built-in user that batch jobs (such as diagnosis migration) run as.
    pub fn system() -> Self {
        // Both constants are canonical, non-blank literals.
        Self {
            uuid: EmrUuid::parse(SYSTEM_USER_UUID).expect("SYSTEM_USER_UUID is canonical"),
            username: NonEmptyText::new(SYSTEM_USERNAME).expect("SYSTEM_USERNAME is not blank"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub creator: Auditor,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub changed_by: Option<Auditor>,
    #[serde(default)]
    pub date_changed: Option<DateTime<Utc>>,
}

impl AuditInfo {
    pub fn created(by: &Auditor, at: DateTime<Utc>) -> Self {
        Self {
            creator: by.clone(),
            date_created: at,
            changed_by: None,
            date_changed: None,
        }
    }

    pub fn touch(&mut self, by: &Auditor, at: DateTime<Utc>) {
        self.changed_by = Some(by.clone());
        self.date_changed = Some(at);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInfo {
    pub voided_by: Auditor,
    pub date_voided: DateTime<Utc>,
    pub reason: NonEmptyText,
}

impl VoidInfo {
    pub fn new(by: &Auditor, at: DateTime<Utc>, reason: NonEmptyText) -> Self {
        Self {
            voided_by: by.clone(),
            date_voided: at,
            reason,
        }
    }
}

/// Validates a caller-supplied void reason.
///
/// # Errors
///
/// Returns [`EmrError::MissingVoidReason`] when the reason is absent or blank.
pub fn void_reason(reason: Option<&str>) -> EmrResult<NonEmptyText> {
    reason
        .and_then(|r| NonEmptyText::new(r).ok())
        .ok_or(EmrError::MissingVoidReason)
}
