use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Core message domain type. This is both the stored row and the wire shape:
/// the JSON field names below are the public API contract, and timestamps
/// serialize as ISO-8601.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: u64,
    pub queue: String,
    pub content: String,
    /// Times this message became claimable again after a prior claim
    /// (lease expiry or explicit return). Zero on first delivery.
    pub requeue_count: u32,
    pub created_at: DateTime<Utc>,
    /// Capability token proving lease ownership. Present iff leased;
    /// regenerated on every successful claim.
    pub receipt: Option<String>,
    /// Lease deadline. `None`, or a value `<= now`, means the message is
    /// available. Always set and cleared together with `receipt`.
    pub lease_expired_at: Option<DateTime<Utc>>,
}

impl Message {
    /// A message is available iff it carries no live lease.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.lease_expired_at {
            None => true,
            Some(deadline) => deadline <= now,
        }
    }

    /// Generate a fresh receipt token for a claim.
    pub fn new_receipt() -> String {
        Uuid::now_v7().to_string()
    }
}

/// Point-in-time queue statistics. Never persisted; recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStat {
    pub queue: String,
    pub message_total: u32,
    pub message_available: u32,
}
