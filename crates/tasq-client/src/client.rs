use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ClientError;

/// How often `wait_for_message` re-polls an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A claimed message as returned by the server.
///
/// Unlike the server's stored row, a claimed message always carries a
/// receipt and a lease deadline, so both fields are non-optional here.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: u64,
    pub receipt: String,
    pub queue: String,
    pub content: String,
    pub requeue_count: u32,
    pub created_at: DateTime<Utc>,
    pub lease_expired_at: DateTime<Utc>,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStat {
    pub queue: String,
    pub message_total: u32,
    pub message_available: u32,
}

/// HTTP client for the tasq server.
///
/// One method per engine operation. Every call maps 1:1 onto a single
/// request; the only retry loop in this crate is `wait_for_message`, which
/// re-polls on "no message available" (a 204, not an error). Transport
/// failures surface to the caller unchanged.
///
/// The client is `Clone`, `Send`, and `Sync` — it can be shared across tasks.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    base: Url,
}

impl QueueClient {
    /// Create a client for the server at `endpoint`, e.g.
    /// `http://localhost:7711`.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let mut endpoint = endpoint.to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base =
            Url::parse(&endpoint).map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))
    }

    /// Create a queue. Idempotent.
    pub async fn create_queue(&self, queue: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("queues")?)
            .json(&queue)
            .send()
            .await?;
        expect_no_content(response).await
    }

    /// Delete a queue and all of its messages, leased or not. Idempotent.
    pub async fn delete_queue(&self, queue: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("queues/{queue}"))?)
            .send()
            .await?;
        expect_no_content(response).await
    }

    /// Fetch total/available message counts for a queue.
    pub async fn get_queue_stat(&self, queue: &str) -> Result<QueueStat, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("queues/{queue}/stat"))?)
            .send()
            .await?;
        let response = expect_status(response, StatusCode::OK).await?;
        Ok(response.json().await?)
    }

    /// Enqueue a message payload at the tail of the queue.
    pub async fn put_message(&self, queue: &str, message: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("queues/{queue}/in"))?)
            .json(&message)
            .send()
            .await?;
        expect_no_content(response).await
    }

    /// Claim the oldest available message, leasing it for `lease` seconds
    /// (the queue's default when `None`). Returns `None` when the queue has
    /// nothing available.
    pub async fn get_message(
        &self,
        queue: &str,
        lease: Option<i64>,
    ) -> Result<Option<QueueMessage>, ClientError> {
        let request = self.http.post(self.url(&format!("queues/{queue}/out"))?);
        let request = match lease {
            Some(lease) => request.json(&lease),
            None => request,
        };
        let response = check_common(request.send().await?).await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => Ok(Some(response.json().await?)),
            status => Err(unexpected(status, response).await),
        }
    }

    /// Extend the lease on a claimed message by `lease` seconds (queue
    /// default when `None`). Rejected when the receipt is stale or the
    /// lease already expired.
    pub async fn extend_message_lease(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
        lease: Option<i64>,
    ) -> Result<(), ClientError> {
        let url = self.receipt_url(&format!("queues/{queue}/messages/{id}/lease"), receipt)?;
        let request = self.http.post(url);
        let request = match lease {
            Some(lease) => request.json(&lease),
            None => request,
        };
        expect_no_content(request.send().await?).await
    }

    /// Return a claimed message to the queue, making it immediately
    /// available again. Same rejection rules as
    /// [`extend_message_lease`](Self::extend_message_lease).
    pub async fn return_message(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
    ) -> Result<(), ClientError> {
        let url = self.receipt_url(&format!("queues/{queue}/messages/{id}/return"), receipt)?;
        expect_no_content(self.http.post(url).send().await?).await
    }

    /// Delete a processed message. Same rejection rules as
    /// [`extend_message_lease`](Self::extend_message_lease).
    pub async fn delete_message(
        &self,
        queue: &str,
        id: u64,
        receipt: &str,
    ) -> Result<(), ClientError> {
        let url = self.receipt_url(&format!("queues/{queue}/messages/{id}"), receipt)?;
        expect_no_content(self.http.delete(url).send().await?).await
    }

    /// Poll `get_message` until a message arrives or `cancel` fires.
    ///
    /// Returns [`ClientError::Cancelled`] on cancellation. Transport errors
    /// are not retried here; an unreachable server surfaces immediately.
    pub async fn wait_for_message(
        &self,
        queue: &str,
        lease: Option<i64>,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<QueueMessage, ClientError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }

            if let Some(message) = self.get_message(queue, lease).await? {
                return Ok(message);
            }
            debug!(%queue, "no message available, polling again");

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            }
        }
    }

    fn receipt_url(&self, path: &str, receipt: &str) -> Result<Url, ClientError> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().append_pair("receipt", receipt);
        Ok(url)
    }
}

/// Map the error statuses shared by all operations; pass everything else
/// through for per-call handling.
async fn check_common(response: Response) -> Result<Response, ClientError> {
    match response.status() {
        StatusCode::NOT_FOUND => {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::InvalidQueueOperation(body))
        }
        StatusCode::BAD_REQUEST => {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::InvalidRequest(body))
        }
        _ => Ok(response),
    }
}

async fn expect_no_content(response: Response) -> Result<(), ClientError> {
    let response = check_common(response).await?;
    match response.status() {
        StatusCode::NO_CONTENT => Ok(()),
        status => Err(unexpected(status, response).await),
    }
}

async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, ClientError> {
    let response = check_common(response).await?;
    if response.status() == expected {
        Ok(response)
    } else {
        let status = response.status();
        Err(unexpected(status, response).await)
    }
}

async fn unexpected(status: StatusCode, response: Response) -> ClientError {
    ClientError::UnexpectedStatus {
        status,
        body: response.text().await.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_gains_trailing_slash() {
        let client = QueueClient::new("http://localhost:7711").unwrap();
        let url = client.url("queues").unwrap();
        assert_eq!(url.as_str(), "http://localhost:7711/queues");

        let client = QueueClient::new("http://localhost:7711/").unwrap();
        let url = client.url(&format!("queues/{}/out", "orders")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:7711/queues/orders/out");
    }

    #[test]
    fn malformed_endpoint_rejected() {
        assert!(matches!(
            QueueClient::new("not a url"),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn receipt_travels_as_query_parameter() {
        let client = QueueClient::new("http://localhost:7711").unwrap();
        let url = client
            .receipt_url("queues/q/messages/3", "abc-123")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:7711/queues/q/messages/3?receipt=abc-123"
        );
    }

    #[test]
    fn message_json_round_trip() {
        let json = r#"{
            "id": 42,
            "receipt": "0192f0c1-aaaa-7bbb-8ccc-123456789abc",
            "queue": "orders",
            "content": "hello",
            "requeueCount": 1,
            "createdAt": "2025-05-02T13:02:49Z",
            "leaseExpiredAt": "2025-05-02T13:03:49Z"
        }"#;
        let msg: QueueMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, 42);
        assert_eq!(msg.requeue_count, 1);
        assert_eq!(msg.queue, "orders");
        assert!(msg.lease_expired_at > msg.created_at);

        let stat: QueueStat = serde_json::from_str(
            r#"{"queue":"orders","messageTotal":3,"messageAvailable":2}"#,
        )
        .unwrap();
        assert_eq!(stat.message_total, 3);
        assert_eq!(stat.message_available, 2);
    }
}
