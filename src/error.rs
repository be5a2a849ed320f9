use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Session {0} was modified concurrently")]
    VersionConflict(String),
    #[error("Session {0} not found")]
    SessionNotFound(String),
    #[error("Malformed state blob: {0}")]
    StateBlobError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Side effect failed: {0}")]
    EffectError(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
