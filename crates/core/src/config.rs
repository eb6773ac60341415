//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Services never read process-wide environment variables during
//! request handling.

use crate::constants::DEFAULT_DATA_DIR;
use crate::error::{EmrError, EmrResult};
use crate::properties::EmrApiProperties;
use crate::store::{AnyStore, FileStore, MemoryStore};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which storage backend to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Memory,
    File,
}

impl FromStr for StoreKind {
    type Err = EmrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "file" => Ok(StoreKind::File),
            other => Err(EmrError::InvalidInput(format!(
                "unknown store kind '{other}' (expected 'memory' or 'file')"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    store_kind: StoreKind,
    properties: EmrApiProperties,
}

impl CoreConfig {
    pub fn new(data_dir: PathBuf, store_kind: StoreKind, properties: EmrApiProperties) -> Self {
        Self {
            data_dir,
            store_kind,
            properties,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    pub fn properties(&self) -> &EmrApiProperties {
        &self.properties
    }

    /// Opens the configured store.
    pub fn open_store(&self) -> EmrResult<AnyStore> {
        match self.store_kind {
            StoreKind::Memory => Ok(AnyStore::Memory(MemoryStore::new())),
            StoreKind::File => FileStore::open(&self.data_dir).map(AnyStore::File),
        }
    }
}

/// Parse the store kind from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`StoreKind::Memory`].
pub fn store_kind_from_env_value(value: Option<String>) -> EmrResult<StoreKind> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<StoreKind>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}

/// Resolve the data directory, falling back to [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}
