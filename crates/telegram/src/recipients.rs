//! Destination chat ids for sends that do not name any.

use std::fmt;
use std::sync::Arc;

/// Environment variable read by [`Recipients::from_env`]
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

type ChatIdFn = dyn Fn() -> Vec<String> + Send + Sync;

/// Resolves the chat ids used by [`TelegramClient::send`].
///
/// The wrapped function runs on every send, so it can follow configuration
/// that changes while the client is running.
///
/// [`TelegramClient::send`]: crate::TelegramClient::send
#[derive(Clone)]
pub struct Recipients(Arc<ChatIdFn>);

impl Recipients {
    /// Resolve chat ids with a custom function
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Always send to the same chats
    pub fn fixed<I, S>(chat_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chat_ids: Vec<String> = chat_ids.into_iter().map(Into::into).collect();
        Self::from_fn(move || chat_ids.clone())
    }

    /// Read a single chat id from `TELEGRAM_CHAT_ID` at every send
    pub fn from_env() -> Self {
        Self::from_fn(env_chat_ids)
    }

    /// Current chat ids, trimmed, with blank entries removed
    pub fn resolve(&self) -> Vec<String> {
        normalize((self.0)())
    }
}

impl Default for Recipients {
    fn default() -> Self {
        Self::from_env()
    }
}

impl fmt::Debug for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Recipients(..)")
    }
}

fn env_chat_ids() -> Vec<String> {
    chat_ids_from(std::env::var(CHAT_ID_ENV).ok())
}

fn chat_ids_from(value: Option<String>) -> Vec<String> {
    match value {
        Some(chat_id) => vec![chat_id],
        None => {
            tracing::warn!(
                "No {} provided, Telegram messages sent without explicit chat ids are dropped",
                CHAT_ID_ENV
            );
            Vec::new()
        }
    }
}

/// Trim chat ids and drop the ones left empty
pub(crate) fn normalize<I, S>(chat_ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    chat_ids
        .into_iter()
        .filter_map(|id| {
            let id = id.as_ref().trim();
            if id.is_empty() {
                tracing::debug!("Skipping blank chat id");
                None
            } else {
                Some(id.to_string())
            }
        })
        .collect()
}
