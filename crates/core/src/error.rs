use encounter_transaction::EtError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EmrError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{kind} not found: {uuid}")]
    NotFound { kind: &'static str, uuid: String },
    #[error("invalid drug: {0}")]
    InvalidDrug(String),
    #[error("invalid order frequency: {0}")]
    InvalidOrderFrequency(String),
    #[error("invalid concept: {0}")]
    InvalidConcept(String),
    #[error("invalid urgency: {0}")]
    InvalidUrgency(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("a void reason is required")]
    MissingVoidReason,

    #[error("store lock poisoned")]
    StorePoisoned,
    #[error("failed to create store directory: {0}")]
    StoreDirCreation(std::io::Error),
    #[error("failed to read store file (path: {path}): {source}", path = path.display())]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write store file (path: {path}): {source}", path = path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record (path: {path}): {source}", path = path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("configuration schema mismatch: {0}")]
    ConfigSchema(String),

    #[error("invalid UUID: {0}")]
    Uuid(#[from] emr_uuid::UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] emr_types::TextError),
}

impl EmrError {
    pub fn not_found(kind: &'static str, uuid: impl ToString) -> Self {
        EmrError::NotFound {
            kind,
            uuid: uuid.to_string(),
        }
    }

    /// True for errors caused by the caller's data rather than by the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EmrError::StorePoisoned
                | EmrError::StoreDirCreation(_)
                | EmrError::StoreRead { .. }
                | EmrError::StoreWrite { .. }
                | EmrError::Serialization(_)
                | EmrError::Deserialization { .. }
                | EmrError::ConfigRead(_)
                | EmrError::ConfigSchema(_)
        )
    }
}

impl From<EtError> for EmrError {
    fn from(err: EtError) -> Self {
        match err {
            EtError::InvalidUrgency(value) => EmrError::InvalidUrgency(value),
            EtError::InvalidInput(msg) => EmrError::Validation(msg),
            EtError::Translation(msg) => EmrError::InvalidInput(msg),
        }
    }
}

pub type EmrResult<T> = std::result::Result<T, EmrError>;
