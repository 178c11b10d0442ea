//! Client configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::error::{Result, TelegramError};
use crate::recipients::Recipients;
use crate::split::MAX_MESSAGE_SIZE;
use crate::transport::{HttpTransport, Transport, DEFAULT_API_URL};

/// Default number of queued messages before `send` waits
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Configuration for a [`TelegramClient`](crate::TelegramClient)
#[derive(Clone)]
pub struct ClientConfig {
    /// Bot token (`123456:ABC...`)
    pub bot_token: String,

    /// Bot API base URL
    pub api_url: String,

    /// HTTP client for the default transport. A client with 30s request
    /// and 10s connect timeouts is built when unset.
    pub http_client: Option<Client>,

    /// Replaces the HTTP transport entirely; `api_url` and `http_client`
    /// are ignored when set
    pub transport: Option<Arc<dyn Transport>>,

    /// Chat ids used by `send`
    pub recipients: Recipients,

    /// Capacity of the send queue
    pub queue_capacity: usize,

    /// Maximum chunk size in bytes
    pub max_message_size: usize,
}

impl ClientConfig {
    /// Create a config with defaults for everything but the token
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            http_client: None,
            transport: None,
            recipients: Recipients::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the Bot API base URL
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Use a shared HTTP client
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Deliver through a custom transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Always send to these chats
    pub fn chat_ids<I, S>(self, chat_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients(Recipients::fixed(chat_ids))
    }

    /// Resolve chats with `f` on every send
    pub fn chat_ids_fn<F>(self, f: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.recipients(Recipients::from_fn(f))
    }

    pub fn recipients(mut self, recipients: Recipients) -> Self {
        self.recipients = recipients;
        self
    }

    /// Set the send queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the maximum chunk size in bytes
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Check that the config can start a client
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            return Err(TelegramError::Config("bot token is empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(TelegramError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(TelegramError::Config(
                "max message size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn build_transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        let client = match &self.http_client {
            Some(client) => client.clone(),
            None => Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()?,
        };

        Ok(Arc::new(HttpTransport::with_base_url(
            client,
            self.api_url.clone(),
        )))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("bot_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("http_client", &self.http_client.is_some())
            .field("transport", &self.transport.is_some())
            .field("recipients", &self.recipients)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}
