/// Low-level storage errors (RocksDB, serialization).
/// This is the error type for the `Storage` trait — storage operations can only
/// fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    RocksDb(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::RocksDb(err.into_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Domain errors for queue engine operations.
///
/// `InvalidQueueOperation` deliberately does not distinguish "lease expired
/// but message not yet reclaimed" from "reclaimed by another consumer" —
/// the caller's recovery path (treat the message as redelivered) is the same
/// either way.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid operation on message {id} in queue {queue}: receipt mismatch or lease expired")]
    InvalidQueueOperation { queue: String, id: u64 },

    #[error("invalid queue name: {0:?}")]
    InvalidQueueName(String),

    #[error("invalid lease: {0} (must be positive seconds)")]
    InvalidLease(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type Result<T> = std::result::Result<T, EngineError>;
