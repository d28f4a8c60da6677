mod client;
mod error;

pub use client::{QueueClient, QueueMessage, QueueStat, DEFAULT_POLL_INTERVAL};
pub use error::ClientError;
