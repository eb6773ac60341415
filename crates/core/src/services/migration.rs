//! One-shot migration of obs-encoded diagnoses into first-class diagnosis records.

use super::diagnoses::DiagnosisMetadata;
use super::observations::void_obs_tree;
use crate::audit::{AuditInfo, Auditor};
use crate::config::CoreConfig;
use crate::constants::DIAGNOSIS_MIGRATED_VOID_REASON;
use crate::error::EmrResult;
use crate::model::Diagnosis;
use crate::store::EmrStore;
use crate::NonEmptyText;
use chrono::Utc;
use emr_uuid::EmrUuid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Groups converted into diagnosis records.
    pub migrated: usize,
    /// Malformed groups left untouched.
    pub skipped: usize,
}

pub struct DiagnosisMigrator<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
}

impl<S: EmrStore> DiagnosisMigrator<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self { cfg, store }
    }

    /// Converts every diagnosis obs group that has not been migrated yet.
    ///
    /// Each new record copies the group's patient, encounter, answer, certainty, rank, creator,
    /// creation date and void status. Groups that were not voided are then voided together with
    /// their members, with reason `"migrated to diagnosis"`. The whole run is one transaction,
    /// and a second run migrates nothing.
    pub fn migrate(&self, auditor: &Auditor) -> EmrResult<MigrationReport> {
        let now = Utc::now();
        let reason = NonEmptyText::new(DIAGNOSIS_MIGRATED_VOID_REASON)?;
        let metadata = DiagnosisMetadata::new(&self.cfg);

        let report = self.store.transaction(|records| {
            let migrated: HashSet<EmrUuid> = records
                .diagnoses
                .values()
                .filter_map(|d| d.source_obs)
                .collect();
            let groups: Vec<_> = records
                .obs
                .values()
                .filter(|obs| metadata.is_diagnosis(obs) && !migrated.contains(&obs.uuid))
                .cloned()
                .collect();

            let mut report = MigrationReport::default();
            for group in groups {
                let decoded = match metadata.to_diagnosis(records, &group) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        tracing::warn!(obs = %group.uuid, error = %err, "skipping diagnosis group");
                        report.skipped += 1;
                        continue;
                    }
                };

                let diagnosis = Diagnosis {
                    uuid: EmrUuid::new(),
                    patient: group.patient,
                    encounter: group.encounter,
                    diagnosis: decoded.answer,
                    certainty: decoded.certainty,
                    rank: decoded.order.rank(),
                    condition: None,
                    form_namespace: group.form_namespace.clone(),
                    form_field_path: group.form_field_path.clone(),
                    source_obs: Some(group.uuid),
                    voided: group.voided.clone(),
                    audit: AuditInfo::created(&group.audit.creator, group.audit.date_created),
                };
                tracing::debug!(obs = %group.uuid, diagnosis = %diagnosis.uuid, "migrating diagnosis");
                records.diagnoses.insert(diagnosis);

                if !group.is_voided() {
                    void_obs_tree(records, group.uuid, auditor, now, &reason)?;
                }
                report.migrated += 1;
            }
            Ok(report)
        })?;

        tracing::info!(
            migrated = report.migrated,
            skipped = report.skipped,
            "diagnosis migration finished"
        );
        Ok(report)
    }
}
