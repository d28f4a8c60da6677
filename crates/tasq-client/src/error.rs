use reqwest::StatusCode;

/// Errors surfaced by [`QueueClient`](crate::QueueClient) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server rejected a receipt-bearing operation: the receipt is
    /// stale/wrong or the lease already expired and the message may have
    /// been reclaimed. Recoverable: the message will be redelivered.
    #[error("invalid queue operation: {0}")]
    InvalidQueueOperation(String),

    /// Malformed input rejected by the server before any state change.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// The caller's cancellation signal fired during a wait. Not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// True when the error is the lease/receipt rejection path rather than
    /// an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::InvalidQueueOperation(_))
    }
}
