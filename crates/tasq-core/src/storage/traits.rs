use crate::error::StorageResult;
use crate::message::Message;

/// Represents a single operation in an atomic write batch.
#[derive(Debug)]
pub enum WriteBatchOp {
    PutMessage { key: Vec<u8>, value: Vec<u8> },
    DeleteMessage { key: Vec<u8> },
    PutState { key: Vec<u8>, value: Vec<u8> },
    DeleteState { key: Vec<u8> },
}

/// Storage trait for all persistence operations. Implementations must be
/// thread-safe.
pub trait Storage: Send + Sync {
    // --- Message operations ---

    /// Store a message row under its full key.
    fn put_message(&self, key: &[u8], message: &Message) -> StorageResult<()>;

    /// Retrieve a message by its full key.
    fn get_message(&self, key: &[u8]) -> StorageResult<Option<Message>>;

    /// Delete a message by its full key.
    fn delete_message(&self, key: &[u8]) -> StorageResult<()>;

    /// List messages whose keys start with the given prefix, in key order.
    /// For message keys this is creation-time order within a queue.
    fn list_messages(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Message)>>;

    // --- State operations ---

    /// Store an engine-metadata key-value pair.
    fn put_state(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Retrieve an engine-metadata value by key.
    fn get_state(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    // --- Batch operations ---

    /// Atomically apply a batch of write operations across column families.
    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()>;
}
