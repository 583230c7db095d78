use std::time::Duration;

use thiserror::Error;

/// Mailbox transport errors. Never fatal: the next tick retries the fetch.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mailbox operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a single failed send attempt against the chat platform.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error {status}: {description}")]
    Server { status: u16, description: String },

    #[error("Rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },
}

impl SendError {
    /// Whether a later attempt may succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SendError::Rejected { .. })
    }
}

/// Returned by the delivery client once it gives up on a message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Still rate limited after {waits} waits")]
    RateLimited { waits: u32 },

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A template matched but its content could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Template {template} matched but has no {field}")]
    MissingField {
        template: &'static str,
        field: &'static str,
    },
}

/// Dedup state file errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Invalid dedup limits: cap {cap}, retain {retain}")]
    InvalidLimits { cap: usize, retain: usize },
}
