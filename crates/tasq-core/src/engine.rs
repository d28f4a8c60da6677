//! The queue engine: storage-backed state machine governing message
//! visibility, lease ownership, and requeue accounting.
//!
//! Claiming is the only operation that must pick *the* oldest available
//! message, so claims for a queue are serialized behind a per-queue async
//! mutex. The receipt-predicate operations (`extend_lease`, `delete`,
//! `return_message`) and `delete_queue` take the same lock: RocksDB gives
//! atomic batches but not conditional row updates, and sharing the
//! serialization point guarantees a stale lease-holder can never interleave
//! its read-check-write with a claim that re-leases the row after expiry.
//! `enqueue` and `stat` never contend on it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{debug, instrument};

use crate::error::{EngineError, Result};
use crate::message::{Message, QueueStat};
use crate::queue::{validate_queue_name, LeaseConfig};
use crate::storage::{keys, Storage, WriteBatchOp};

pub struct QueueEngine {
    storage: Arc<dyn Storage>,
    lease_config: LeaseConfig,
    /// Next message id to hand out. The persisted counter is written in the
    /// same batch as the enqueued message, under this lock, so an issued id
    /// can never outrun the stored counter.
    id_alloc: tokio::sync::Mutex<u64>,
    /// Per-queue claim serialization points, created on first touch.
    queue_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl QueueEngine {
    /// Open an engine over the given storage, restoring the id counter.
    pub fn open(storage: Arc<dyn Storage>, lease_config: LeaseConfig) -> Result<Self> {
        let next_id = match storage.get_state(keys::STATE_NEXT_MESSAGE_ID)? {
            Some(raw) => keys::decode_u64_state(&raw).ok_or_else(|| {
                crate::error::StorageError::CorruptData(
                    "next_message_id counter is not 8 bytes".to_string(),
                )
            })?,
            None => 1,
        };
        Ok(Self {
            storage,
            lease_config,
            id_alloc: tokio::sync::Mutex::new(next_id),
            queue_locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn queue_lock(&self, queue: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.queue_locks.lock().expect("queue lock table poisoned");
        Arc::clone(locks.entry(queue.to_string()).or_default())
    }

    /// Effective lease for a claim or extension: per-call override, else the
    /// queue's configured default. Rejects non-positive values.
    fn effective_lease(&self, queue: &str, lease: Option<i64>) -> Result<TimeDelta> {
        let secs = lease.unwrap_or_else(|| self.lease_config.lease_for(queue));
        if secs <= 0 {
            return Err(EngineError::InvalidLease(secs));
        }
        TimeDelta::try_seconds(secs).ok_or(EngineError::InvalidLease(secs))
    }

    /// Locate a message row by id within a queue.
    fn find_message(&self, queue: &str, id: u64) -> Result<Option<(Vec<u8>, Message)>> {
        let rows = self.storage.list_messages(&keys::message_prefix(queue))?;
        Ok(rows.into_iter().find(|(_, msg)| msg.id == id))
    }

    /// Create a queue. Queues have no row of their own (a queue exists
    /// exactly when messages carry its name), so this only validates the
    /// name. Idempotent.
    #[instrument(skip(self))]
    pub async fn create_queue(&self, queue: &str) -> Result<()> {
        validate_queue_name(queue)?;
        debug!(%queue, "queue created");
        Ok(())
    }

    /// Delete every message in the queue, leased or not. Idempotent:
    /// deleting an empty or never-used queue succeeds.
    #[instrument(skip(self))]
    pub async fn delete_queue(&self, queue: &str) -> Result<()> {
        validate_queue_name(queue)?;
        let lock = self.queue_lock(queue);
        let _guard = lock.lock().await;

        let rows = self.storage.list_messages(&keys::message_prefix(queue))?;
        let purged = rows.len();
        if purged > 0 {
            let ops = rows
                .into_iter()
                .map(|(key, _)| WriteBatchOp::DeleteMessage { key })
                .collect();
            self.storage.write_batch(ops)?;
        }
        debug!(%queue, purged, "queue deleted");
        Ok(())
    }

    /// Insert a new message at the tail of the queue, returning its id.
    #[instrument(skip(self, content))]
    pub async fn enqueue(&self, queue: &str, content: String) -> Result<u64> {
        validate_queue_name(queue)?;

        let mut next_id = self.id_alloc.lock().await;
        let id = *next_id;

        let message = Message {
            id,
            queue: queue.to_string(),
            content,
            requeue_count: 0,
            created_at: Utc::now(),
            receipt: None,
            lease_expired_at: None,
        };
        let key = keys::message_key(queue, message.created_at, id);
        let value = serde_json::to_vec(&message).map_err(crate::error::StorageError::from)?;

        self.storage.write_batch(vec![
            WriteBatchOp::PutMessage { key, value },
            WriteBatchOp::PutState {
                key: keys::STATE_NEXT_MESSAGE_ID.to_vec(),
                value: keys::encode_u64_state(id + 1),
            },
        ])?;
        *next_id = id + 1;

        debug!(%queue, id, "message enqueued");
        Ok(id)
    }

    /// Claim the oldest available message, leasing it to the caller.
    ///
    /// Returns `None` when nothing is available. On success the message
    /// carries a fresh receipt and `lease_expired_at = now + lease`. The
    /// requeue count is incremented only when the row still holds a previous
    /// (expired) lease, i.e. when this claim is a redelivery rather than a
    /// first delivery.
    #[instrument(skip(self))]
    pub async fn claim(&self, queue: &str, lease: Option<i64>) -> Result<Option<Message>> {
        validate_queue_name(queue)?;
        let lease = self.effective_lease(queue, lease)?;

        let lock = self.queue_lock(queue);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let rows = self.storage.list_messages(&keys::message_prefix(queue))?;
        let Some((key, mut msg)) = rows.into_iter().find(|(_, m)| m.is_available(now)) else {
            return Ok(None);
        };

        if msg.lease_expired_at.is_some() {
            // A previous lease ran out without the holder resolving the
            // message; this claim is a redelivery.
            msg.requeue_count += 1;
        }
        msg.receipt = Some(Message::new_receipt());
        msg.lease_expired_at = now.checked_add_signed(lease).map(Some).ok_or(
            EngineError::InvalidLease(lease.num_seconds()),
        )?;

        self.storage.put_message(&key, &msg)?;
        debug!(%queue, id = msg.id, requeue_count = msg.requeue_count, "message claimed");
        Ok(Some(msg))
    }

    /// Extend a live lease by `lease` seconds (added to the current
    /// deadline, not to now). Rejected unless the `(queue, id, receipt)`
    /// triple matches and the lease has not yet expired.
    #[instrument(skip(self, receipt))]
    pub async fn extend_lease(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
        lease: Option<i64>,
    ) -> Result<()> {
        validate_queue_name(queue)?;
        let lease = self.effective_lease(queue, lease)?;

        let lock = self.queue_lock(queue);
        let _guard = lock.lock().await;

        let (key, mut msg) = self.checked_message(queue, id, receipt)?;
        let Some(deadline) = msg.lease_expired_at else {
            // checked_message only returns rows with a live lease.
            return Err(EngineError::InvalidQueueOperation {
                queue: queue.to_string(),
                id,
            });
        };
        msg.lease_expired_at = deadline.checked_add_signed(lease).map(Some).ok_or(
            EngineError::InvalidLease(lease.num_seconds()),
        )?;

        self.storage.put_message(&key, &msg)?;
        debug!(%queue, id, "lease extended");
        Ok(())
    }

    /// Permanently remove a processed message. Same predicate as
    /// [`extend_lease`](Self::extend_lease).
    #[instrument(skip(self, receipt))]
    pub async fn delete(&self, queue: &str, id: u64, receipt: &str) -> Result<()> {
        validate_queue_name(queue)?;

        let lock = self.queue_lock(queue);
        let _guard = lock.lock().await;

        let (key, _) = self.checked_message(queue, id, receipt)?;
        self.storage.delete_message(&key)?;
        debug!(%queue, id, "message deleted");
        Ok(())
    }

    /// Return a message to the queue: the lease is released, the message is
    /// immediately available again, and the requeue count records the
    /// round trip. Same predicate as [`extend_lease`](Self::extend_lease).
    #[instrument(skip(self, receipt))]
    pub async fn return_message(&self, queue: &str, id: u64, receipt: &str) -> Result<()> {
        validate_queue_name(queue)?;

        let lock = self.queue_lock(queue);
        let _guard = lock.lock().await;

        let (key, mut msg) = self.checked_message(queue, id, receipt)?;
        msg.receipt = None;
        msg.lease_expired_at = None;
        msg.requeue_count += 1;

        self.storage.put_message(&key, &msg)?;
        debug!(%queue, id, requeue_count = msg.requeue_count, "message returned");
        Ok(())
    }

    /// Compute total and available message counts as of the call.
    #[instrument(skip(self))]
    pub async fn stat(&self, queue: &str) -> Result<QueueStat> {
        validate_queue_name(queue)?;

        let now = Utc::now();
        let rows = self.storage.list_messages(&keys::message_prefix(queue))?;
        let message_total = rows.len() as u32;
        let message_available = rows.iter().filter(|(_, m)| m.is_available(now)).count() as u32;

        Ok(QueueStat {
            queue: queue.to_string(),
            message_total,
            message_available,
        })
    }

    /// The compound predicate shared by every mutating operation on a
    /// claimed message: exact id, exact receipt, lease still live. A stale
    /// holder (one whose lease expired, whether or not the message has been
    /// reclaimed) always gets `InvalidQueueOperation`.
    fn checked_message(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
    ) -> Result<(Vec<u8>, Message)> {
        let rejected = || EngineError::InvalidQueueOperation {
            queue: queue.to_string(),
            id,
        };

        let (key, msg) = self.find_message(queue, id)?.ok_or_else(rejected)?;
        let held = msg.receipt.as_deref() == Some(receipt);
        let live = matches!(msg.lease_expired_at, Some(deadline) if deadline > Utc::now());
        if !held || !live {
            return Err(rejected());
        }
        Ok((key, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RocksDbStorage;
    use std::time::Duration;

    fn test_engine() -> (Arc<QueueEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let engine = QueueEngine::open(storage, LeaseConfig::default()).unwrap();
        (Arc::new(engine), dir)
    }

    #[tokio::test]
    async fn enqueue_and_claim_in_fifo_order() {
        let (engine, _dir) = test_engine();
        engine.create_queue("q").await.unwrap();

        for content in ["1", "2", "3"] {
            engine.enqueue("q", content.to_string()).await.unwrap();
        }

        for expected in ["1", "2", "3"] {
            let msg = engine.claim("q", None).await.unwrap().unwrap();
            assert_eq!(msg.content, expected);
            assert_eq!(msg.requeue_count, 0);
            assert!(msg.receipt.is_some());
            assert!(msg.lease_expired_at.unwrap() > Utc::now());
        }

        assert!(
            engine.claim("q", None).await.unwrap().is_none(),
            "everything is leased; nothing left to claim"
        );
    }

    #[tokio::test]
    async fn claim_on_empty_or_unknown_queue_returns_none() {
        let (engine, _dir) = test_engine();
        assert!(engine.claim("nothing-here", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_rejects_non_positive_lease() {
        let (engine, _dir) = test_engine();
        engine.enqueue("q", "x".to_string()).await.unwrap();

        for bad in [0, -5] {
            let err = engine.claim("q", Some(bad)).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidLease(l) if l == bad));
        }
    }

    #[tokio::test]
    async fn invalid_queue_names_rejected() {
        let (engine, _dir) = test_engine();
        for bad in ["", "*", "a b"] {
            assert!(matches!(
                engine.create_queue(bad).await.unwrap_err(),
                EngineError::InvalidQueueName(_)
            ));
            assert!(engine.enqueue(bad, "x".to_string()).await.is_err());
        }
    }

    #[tokio::test]
    async fn delete_with_receipt_removes_message() {
        let (engine, _dir) = test_engine();
        let id = engine.enqueue("q", "x".to_string()).await.unwrap();

        let msg = engine.claim("q", None).await.unwrap().unwrap();
        let receipt = msg.receipt.unwrap();
        engine.delete("q", id, &receipt).await.unwrap();

        let stat = engine.stat("q").await.unwrap();
        assert_eq!(stat.message_total, 0);

        // Deleting again with the same receipt is a rejection, not a panic.
        assert!(matches!(
            engine.delete("q", id, &receipt).await.unwrap_err(),
            EngineError::InvalidQueueOperation { .. }
        ));
    }

    #[tokio::test]
    async fn wrong_receipt_is_rejected() {
        let (engine, _dir) = test_engine();
        let id = engine.enqueue("q", "x".to_string()).await.unwrap();
        let _msg = engine.claim("q", None).await.unwrap().unwrap();

        for op_err in [
            engine.extend_lease("q", id, "bogus", None).await.unwrap_err(),
            engine.delete("q", id, "bogus").await.unwrap_err(),
            engine.return_message("q", id, "bogus").await.unwrap_err(),
        ] {
            assert!(matches!(op_err, EngineError::InvalidQueueOperation { .. }));
        }
    }

    #[tokio::test]
    async fn expired_lease_rejects_old_receipt_and_redelivers() {
        let (engine, _dir) = test_engine();
        let id = engine.enqueue("q", "x".to_string()).await.unwrap();

        let first = engine.claim("q", Some(1)).await.unwrap().unwrap();
        let old_receipt = first.receipt.clone().unwrap();
        assert_eq!(first.requeue_count, 0);

        // While the lease is live the message is invisible.
        assert!(engine.claim("q", Some(1)).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        // The lease ran out: the old receipt is dead for every operation.
        assert!(engine.extend_lease("q", id, &old_receipt, None).await.is_err());
        assert!(engine.delete("q", id, &old_receipt).await.is_err());
        assert!(engine.return_message("q", id, &old_receipt).await.is_err());

        // And the message is claimable again, as a redelivery.
        let second = engine.claim("q", Some(1)).await.unwrap().unwrap();
        assert_eq!(second.id, id);
        assert_eq!(second.requeue_count, 1);
        assert_ne!(second.receipt, Some(old_receipt));
    }

    #[tokio::test]
    async fn return_makes_message_immediately_available() {
        let (engine, _dir) = test_engine();
        let id = engine.enqueue("q", "x".to_string()).await.unwrap();

        let msg = engine.claim("q", None).await.unwrap().unwrap();
        engine
            .return_message("q", id, &msg.receipt.unwrap())
            .await
            .unwrap();

        let again = engine.claim("q", None).await.unwrap().unwrap();
        assert_eq!(again.id, id);
        // Return already accounted for the round trip; the claim of an
        // unleased row must not double-count it.
        assert_eq!(again.requeue_count, 1);
    }

    #[tokio::test]
    async fn extend_lease_adds_to_current_deadline() {
        let (engine, _dir) = test_engine();
        let id = engine.enqueue("q", "x".to_string()).await.unwrap();

        let msg = engine.claim("q", Some(10)).await.unwrap().unwrap();
        let receipt = msg.receipt.unwrap();
        let deadline = msg.lease_expired_at.unwrap();

        engine.extend_lease("q", id, &receipt, Some(10)).await.unwrap();

        // Extension stacks on the previous deadline rather than restarting
        // from now, so the message stays invisible.
        assert!(engine.claim("q", None).await.unwrap().is_none());
        let stat = engine.stat("q").await.unwrap();
        assert_eq!(stat.message_available, 0);

        let (_, row) = engine.find_message("q", id).unwrap().unwrap();
        assert_eq!(row.lease_expired_at.unwrap(), deadline + TimeDelta::seconds(10));
    }

    #[tokio::test]
    async fn delete_queue_purges_leased_messages_and_is_idempotent() {
        let (engine, _dir) = test_engine();
        engine.enqueue("q", "a".to_string()).await.unwrap();
        engine.enqueue("q", "b".to_string()).await.unwrap();
        let _leased = engine.claim("q", None).await.unwrap().unwrap();

        engine.delete_queue("q").await.unwrap();
        assert_eq!(engine.stat("q").await.unwrap().message_total, 0);

        // Twice, and on a queue that never existed.
        engine.delete_queue("q").await.unwrap();
        engine.delete_queue("never-created").await.unwrap();
    }

    #[tokio::test]
    async fn stat_counts_total_and_available() {
        let (engine, _dir) = test_engine();
        for content in ["a", "b", "c"] {
            engine.enqueue("q", content.to_string()).await.unwrap();
        }
        let _leased = engine.claim("q", None).await.unwrap().unwrap();

        let stat = engine.stat("q").await.unwrap();
        assert_eq!(stat.message_total, 3);
        assert_eq!(stat.message_available, 2);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_message() {
        let (engine, _dir) = test_engine();
        engine.enqueue("q", "only".to_string()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(
                async move { engine.claim("q", None).await },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one concurrent claim may win");
    }

    #[tokio::test]
    async fn message_ids_stay_unique_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first_batch = {
            let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
            let engine = QueueEngine::open(storage, LeaseConfig::default()).unwrap();
            let mut ids = Vec::new();
            for _ in 0..3 {
                ids.push(engine.enqueue("q", "x".to_string()).await.unwrap());
            }
            ids
        };

        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let engine = QueueEngine::open(storage, LeaseConfig::default()).unwrap();
        let next = engine.enqueue("q", "y".to_string()).await.unwrap();

        assert!(
            next > *first_batch.iter().max().unwrap(),
            "ids must keep increasing after restart"
        );
    }

    #[tokio::test]
    async fn per_queue_lease_override_applies() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let mut config = LeaseConfig::default();
        config.leases.insert("fast".to_string(), 1);
        let engine = QueueEngine::open(storage, config).unwrap();

        engine.enqueue("fast", "x".to_string()).await.unwrap();
        let msg = engine.claim("fast", None).await.unwrap().unwrap();
        let remaining = msg.lease_expired_at.unwrap() - Utc::now();
        assert!(remaining <= TimeDelta::seconds(1), "configured 1s lease");

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(engine.claim("fast", None).await.unwrap().is_some());
    }
}
