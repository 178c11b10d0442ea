use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use telegram::{ClientConfig, TelegramClient, DEFAULT_API_URL};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Send a message to one or more Telegram chats
#[derive(Debug, Parser)]
#[command(name = "tgsend", version)]
struct Args {
    /// Bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Destination chat ids, comma separated
    #[arg(long, env = "TELEGRAM_CHAT_ID", value_delimiter = ',')]
    to: Vec<String>,

    /// Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Seconds to wait for queued messages on shutdown
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Message text (defaults to the current time)
    message: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if !has_chat_ids(&args.to) {
        tracing::warn!("No chat ids given with --to or TELEGRAM_CHAT_ID, nothing will be sent");
    }

    let config = ClientConfig::new(args.token)
        .api_url(args.api_url)
        .chat_ids(args.to);
    let client = TelegramClient::start(config).context("Failed to start Telegram client")?;

    // Ends when the worker stops
    let mut errors = client.errors().context("Error stream already taken")?;
    let reporter = tokio::spawn(async move {
        while let Some(e) = errors.recv().await {
            tracing::error!("{}", e);
        }
    });

    let text = args.message.unwrap_or_else(|| {
        format!(
            "It is {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S %:z")
        )
    });
    if let Err(e) = client.send(&text).await {
        tracing::error!("Failed to queue message: {}", e);
    }

    let stopped = client.stop(Duration::from_secs(args.timeout)).await;
    reporter.await.ok();

    stopped.context("Stopping Telegram client")
}

fn has_chat_ids(ids: &[String]) -> bool {
    ids.iter().any(|id| !id.trim().is_empty())
}
