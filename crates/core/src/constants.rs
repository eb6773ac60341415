//! Constants used throughout the EMR core crate.

/// Default directory for the file-backed store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "emr_data";

/// Properties file read by the binaries when `EMR_PROPERTIES_FILE` is unset.
pub const DEFAULT_PROPERTIES_FILE: &str = "config/emr-properties.yaml";

/// Extension of entity files written by the file-backed store.
pub const RECORD_FILE_EXTENSION: &str = "json";

/// Void reason recorded on a condition superseded by an edit with the same status.
pub const CONDITION_UPDATED_VOID_REASON: &str = "updated";

/// Void reason recorded on obs groups converted into first-class diagnoses.
pub const DIAGNOSIS_MIGRATED_VOID_REASON: &str = "migrated to diagnosis";

/// Void reason recorded on diagnosis obs members replaced by a re-saved diagnosis.
pub const DIAGNOSIS_REVISED_VOID_REASON: &str = "diagnosis revised";

/// Username of the built-in system auditor used by batch jobs.
pub const SYSTEM_USERNAME: &str = "daemon";

/// Fixed identifier of the built-in system auditor.
pub const SYSTEM_USER_UUID: &str = "a4b4a1d6-0000-4000-8000-00000000da3e";

/// Void reason recorded on a disposition superseded by a new one in the same encounter.
pub const DISPOSITION_REPLACED_VOID_REASON: &str = "replaced";
