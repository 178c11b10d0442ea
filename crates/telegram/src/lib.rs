//! Queued Telegram Bot API sender.
//!
//! Messages are split into chunks that fit the Bot API limits, queued, and
//! delivered in order by a single background task. Delivery failures are
//! reported on a separate stream instead of being returned to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use telegram::{ClientConfig, TelegramClient};
//!
//! let client = TelegramClient::start(ClientConfig::new("BOT_TOKEN").chat_ids(["CHAT_ID"]))?;
//! client.send("Hello, World!").await?;
//! client.stop(Duration::from_secs(10)).await?;
//! ```

mod client;
mod config;
mod error;
mod recipients;
mod split;
mod transport;
mod worker;

pub use client::TelegramClient;
pub use config::{ClientConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{DeliveryError, Result, TelegramError};
pub use recipients::{Recipients, CHAT_ID_ENV};
pub use split::{split_message, MAX_MESSAGE_SIZE};
pub use transport::{HttpTransport, Transport, DEFAULT_API_URL};
