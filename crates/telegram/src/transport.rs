use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TelegramError};

/// Default Telegram Bot API base URL
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Delivery of a single text message to a single chat.
///
/// The send worker only depends on this trait, so tests and alternative
/// backends can replace the HTTP implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `text` to `chat_id` using the bot identified by `token`.
    ///
    /// # Errors
    ///
    /// - `TelegramError::Http` if the endpoint could not be reached
    /// - `TelegramError::Api` if the request was rejected
    /// - `TelegramError::Response` if the reply could not be read
    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Error payload returned by the Bot API
#[derive(Deserialize)]
struct ApiErrorResponse {
    description: Option<String>,
}

/// Telegram Bot API transport over HTTP
pub struct HttpTransport {
    client: Client,
    base_url: Arc<str>,
}

impl HttpTransport {
    /// Create a transport talking to the public Telegram API
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_API_URL)
    }

    /// Create a transport for a custom API base URL (self-hosted Bot API
    /// server, test server)
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            base_url: Arc::from(base_url),
        }
    }

    fn url(&self, token: &str) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, token)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<()> {
        // reqwest errors carry the URL, which contains the bot token
        let resp = self
            .client
            .post(self.url(token))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.without_url()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|r| r.description)
                .unwrap_or(body);
            return Err(TelegramError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| TelegramError::Response(e.without_url()))?;

        tracing::debug!(chat_id, response = %body, "Message sent to Telegram");
        Ok(())
    }
}
