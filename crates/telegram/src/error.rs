use thiserror::Error;

/// Telegram client errors
#[derive(Debug, Error)]
pub enum TelegramError {
    /// HTTP request could not be completed (connection, TLS, timeout)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram answered with a non-200 status
    #[error("Telegram API error: {status_code} - {message}")]
    Api { status_code: u16, message: String },

    /// Status was 200 but the body could not be read
    #[error("Failed to read Telegram response: {0}")]
    Response(#[source] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The send queue no longer accepts messages
    #[error("Send queue closed")]
    Closed,

    /// `pending` counts queued messages plus the one that was being sent
    #[error("Shutdown deadline exceeded, {pending} messages discarded")]
    DeadlineExceeded { pending: usize },

    #[error("Send worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl TelegramError {
    /// Whether the endpoint could not be reached at all
    pub fn is_transport(&self) -> bool {
        matches!(self, TelegramError::Http(_))
    }

    /// Whether Telegram received the request and refused it
    pub fn is_rejected(&self) -> bool {
        matches!(self, TelegramError::Api { .. })
    }
}

/// A message that the worker failed to deliver.
///
/// Reported on the client's error stream. `source` keeps the failure kind
/// (transport, rejection or unreadable response).
#[derive(Debug, Error)]
#[error("Delivery to chat {chat_id} failed: {source}")]
pub struct DeliveryError {
    pub chat_id: String,
    #[source]
    pub source: TelegramError,
}

pub type Result<T> = std::result::Result<T, TelegramError>;
