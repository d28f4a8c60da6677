pub mod engine;
pub mod error;
pub mod message;
pub mod queue;
pub mod storage;
pub mod telemetry;

pub use engine::QueueEngine;
pub use error::{EngineError, StorageError, StorageResult};
pub use message::{Message, QueueStat};
pub use queue::LeaseConfig;
pub use storage::{RocksDbStorage, Storage, WriteBatchOp};
