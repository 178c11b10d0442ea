use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{DeliveryError, Result, TelegramError};
use crate::recipients::{normalize, Recipients};
use crate::split::split_message;
use crate::worker::{Outbound, Worker};

/// Shutdown signal and join handle of the running worker
struct Lifecycle {
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

/// Queued Telegram sender.
///
/// Messages are split into chunks, queued, and delivered in order by a
/// single background task. Delivery failures never reach the caller of
/// [`send`](Self::send); they show up on the stream returned by
/// [`errors`](Self::errors).
///
/// Call [`stop`](Self::stop) before exiting so queued messages get a chance
/// to go out.
pub struct TelegramClient {
    recipients: Recipients,
    max_message_size: usize,
    /// Taken by `stop`, which closes the queue for new messages
    sender: Mutex<Option<mpsc::Sender<Outbound>>>,
    /// Queued plus in-flight messages
    pending: Arc<AtomicUsize>,
    errors: Mutex<Option<mpsc::Receiver<DeliveryError>>>,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl TelegramClient {
    /// Validate `config` and spawn the send worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = config.build_transport()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (error_sender, error_receiver) = mpsc::channel(1);
        let (shutdown, shutdown_receiver) = oneshot::channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = Worker::new(
            config.bot_token,
            transport,
            receiver,
            error_sender,
            shutdown_receiver,
            Arc::clone(&pending),
        );
        let worker = tokio::spawn(worker.run());

        tracing::debug!(
            queue_capacity = config.queue_capacity,
            max_message_size = config.max_message_size,
            "Telegram client started"
        );

        Ok(Self {
            recipients: config.recipients,
            max_message_size: config.max_message_size,
            sender: Mutex::new(Some(sender)),
            pending,
            errors: Mutex::new(Some(error_receiver)),
            lifecycle: Mutex::new(Some(Lifecycle { shutdown, worker })),
        })
    }

    /// Queue `text` for the chats returned by the configured recipients.
    ///
    /// Recipients are resolved once per call. No chats means nothing is
    /// queued.
    pub async fn send(&self, text: &str) -> Result<()> {
        let chat_ids = self.recipients.resolve();
        self.enqueue(text, &chat_ids).await
    }

    /// Queue `text` for the given chats.
    ///
    /// Long messages are split and every chat receives chunk `n` before any
    /// chat receives chunk `n + 1`. Waits while the queue is full but not
    /// for delivery.
    ///
    /// # Errors
    ///
    /// `TelegramError::Closed` once [`stop`](Self::stop) has been called.
    pub async fn send_to<I, S>(&self, text: &str, chat_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chat_ids = normalize(chat_ids);
        self.enqueue(text, &chat_ids).await
    }

    async fn enqueue(&self, text: &str, chat_ids: &[String]) -> Result<()> {
        if chat_ids.is_empty() {
            tracing::debug!("No chat ids, message not queued");
            return Ok(());
        }

        // Cloned so the lock is not held while waiting for queue space
        let Some(sender) = self.sender.lock().clone() else {
            tracing::warn!("Telegram client stopped, message not queued");
            return Err(TelegramError::Closed);
        };

        for chunk in split_message(text, self.max_message_size) {
            for chat_id in chat_ids {
                let unit = Outbound {
                    chat_id: chat_id.clone(),
                    text: chunk.to_string(),
                };
                self.pending.fetch_add(1, Ordering::SeqCst);
                if sender.send(unit).await.is_err() {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    tracing::warn!("Telegram client stopped, dropping message for {}", chat_id);
                    return Err(TelegramError::Closed);
                }
            }
        }

        Ok(())
    }

    /// Take the delivery error stream.
    ///
    /// Holds at most one unread error; failures while it is full are
    /// dropped. The stream ends once the worker has stopped. Returns `None`
    /// after the first call.
    pub fn errors(&self) -> Option<mpsc::Receiver<DeliveryError>> {
        self.errors.lock().take()
    }

    /// Number of messages accepted but not yet delivered, counting the one
    /// being sent
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether the queue has stopped accepting messages
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map_or(true, mpsc::Sender::is_closed)
    }

    /// Stop accepting messages and wait up to `deadline` for the queue to
    /// drain.
    ///
    /// If the deadline passes first the worker is aborted and the messages
    /// still queued are discarded. Calling `stop` again is a no-op.
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        // Dropping our sender rejects every later send right away
        drop(self.sender.lock().take());

        let lifecycle = self.lifecycle.lock().take();
        let Some(Lifecycle {
            shutdown,
            mut worker,
        }) = lifecycle
        else {
            return Ok(());
        };

        // The worker may already be gone if it panicked
        let _ = shutdown.send(());

        match tokio::time::timeout(deadline, &mut worker).await {
            Ok(Ok(())) => {
                tracing::info!("All Telegram messages processed");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!("Telegram send worker failed: {}", e);
                Err(TelegramError::Worker(e))
            }
            Err(_) => {
                let pending = self.pending();
                worker.abort();
                tracing::warn!(
                    "Shutdown deadline exceeded, {} Telegram messages discarded",
                    pending
                );
                Err(TelegramError::DeadlineExceeded { pending })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use mockito::Matcher;
    use serde_json::json;

    use crate::transport::Transport;

    /// Records every delivery, optionally sleeping or failing
    #[derive(Default)]
    struct FakeTransport {
        calls: Mutex<Vec<(String, String)>>,
        delay: Duration,
        fail: bool,
    }

    impl FakeTransport {
        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Default::default()
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_message(&self, _token: &str, chat_id: &str, text: &str) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls
                .lock()
                .push((chat_id.to_string(), text.to_string()));
            if self.fail {
                return Err(TelegramError::Api {
                    status_code: 403,
                    message: "Forbidden: bot was blocked by the user".to_string(),
                });
            }
            Ok(())
        }
    }

    fn start_with(transport: Arc<FakeTransport>) -> TelegramClient {
        let config = ClientConfig::new("test-token")
            .transport(transport)
            .chat_ids(["a", "b"]);
        TelegramClient::start(config).unwrap()
    }

    #[tokio::test]
    async fn test_long_message_is_sent_chunk_major() {
        let transport = Arc::new(FakeTransport::default());
        let client = start_with(transport.clone());

        let msg: String = ('a'..='e').flat_map(|c| std::iter::repeat(c).take(1000)).collect();
        client.send(&msg).await.unwrap();
        client.stop(Duration::from_secs(5)).await.unwrap();

        let calls = transport.calls();
        let chats: Vec<&str> = calls.iter().map(|(chat, _)| chat.as_str()).collect();
        assert_eq!(chats, vec!["a", "b", "a", "b", "a", "b"]);

        let sizes: Vec<usize> = calls.iter().map(|(_, text)| text.len()).collect();
        assert_eq!(sizes, vec![2048, 2048, 2048, 2048, 904, 904]);

        assert_eq!(calls[0].1, calls[1].1);
        let rebuilt: String = calls.iter().step_by(2).map(|(_, t)| t.as_str()).collect();
        assert_eq!(rebuilt, msg);
    }

    #[tokio::test]
    async fn test_delivery_is_fifo() {
        let transport = Arc::new(FakeTransport::default());
        let client = start_with(transport.clone());

        for i in 0..40 {
            client.send_to(&format!("message {i}"), ["solo"]).await.unwrap();
        }
        client.stop(Duration::from_secs(5)).await.unwrap();

        let texts: Vec<String> = transport.calls().into_iter().map(|(_, t)| t).collect();
        let expected: Vec<String> = (0..40).map(|i| format!("message {i}")).collect();
        assert_eq!(texts, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_queue_to_drain() {
        let transport = FakeTransport::slow(Duration::from_millis(10));
        let client = start_with(transport.clone());

        for i in 0..5 {
            client.send_to(&format!("m{i}"), ["x"]).await.unwrap();
        }
        client.stop(Duration::from_secs(1)).await.unwrap();

        assert_eq!(transport.calls().len(), 5);
        assert!(client.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_deadline_exceeded() {
        let transport = FakeTransport::slow(Duration::from_secs(1));
        let client = start_with(transport.clone());

        for i in 0..3 {
            client.send_to(&format!("m{i}"), ["x"]).await.unwrap();
        }
        let err = client.stop(Duration::from_millis(100)).await.unwrap_err();

        // m0 is still in flight and counts as pending
        assert!(matches!(err, TelegramError::DeadlineExceeded { pending: 3 }));

        // Nothing goes out after stop has given up
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_queue_before_draining() {
        let transport = FakeTransport::slow(Duration::from_secs(1));
        let client = Arc::new(start_with(transport.clone()));

        client.send_to("first", ["x"]).await.unwrap();
        let stopping = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.stop(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The worker is still busy with "first"
        let err = client.send_to("after stop", ["x"]).await.unwrap_err();
        assert!(matches!(err, TelegramError::Closed));
        assert!(client.is_closed());

        stopping.await.unwrap().unwrap();
        assert_eq!(transport.calls(), vec![("x".to_string(), "first".to_string())]);
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_counts_in_flight_message() {
        let transport = FakeTransport::slow(Duration::from_secs(1));
        let client = start_with(transport.clone());

        client.send_to("one", ["x"]).await.unwrap();
        client.send_to("two", ["x"]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.pending(), 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(client.pending(), 1);

        client.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn test_recurring_failure_yields_single_error() {
        let transport = FakeTransport::failing();
        let client = start_with(transport.clone());
        let mut errors = client.errors().unwrap();

        client.send("one").await.unwrap();
        client.send("two").await.unwrap();
        client.stop(Duration::from_secs(5)).await.unwrap();

        assert_eq!(transport.calls().len(), 4);
        let err = errors.recv().await.unwrap();
        assert_eq!(err.chat_id, "a");
        assert!(err.source.is_rejected());
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_errors_can_be_taken_once() {
        let client = start_with(Arc::new(FakeTransport::default()));
        assert!(client.errors().is_some());
        assert!(client.errors().is_none());
        client.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_stop_is_rejected() {
        let transport = Arc::new(FakeTransport::default());
        let client = start_with(transport.clone());
        client.stop(Duration::from_secs(1)).await.unwrap();

        let err = client.send("too late").await.unwrap_err();
        assert!(matches!(err, TelegramError::Closed));
        assert!(transport.calls().is_empty());

        // Second stop is a no-op
        client.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_without_recipients_queues_nothing() {
        let transport = Arc::new(FakeTransport::default());
        let config = ClientConfig::new("test-token")
            .transport(transport.clone())
            .chat_ids_fn(Vec::new);
        let client = TelegramClient::start(config).unwrap();

        client.send("nobody listens").await.unwrap();
        client.send_to("still nobody", [" ", ""]).await.unwrap();
        client.stop(Duration::from_secs(1)).await.unwrap();

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recipients_are_resolved_per_send() {
        let transport = Arc::new(FakeTransport::default());
        let current = Arc::new(Mutex::new(vec!["first".to_string()]));
        let source = Arc::clone(&current);
        let config = ClientConfig::new("test-token")
            .transport(transport.clone())
            .chat_ids_fn(move || source.lock().clone());
        let client = TelegramClient::start(config).unwrap();

        client.send("1").await.unwrap();
        *current.lock() = vec!["second".to_string(), " third ".to_string()];
        client.send("2").await.unwrap();
        client.stop(Duration::from_secs(1)).await.unwrap();

        let chats: Vec<String> = transport.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(chats, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_applies_backpressure() {
        let transport = FakeTransport::slow(Duration::from_millis(50));
        let config = ClientConfig::new("test-token")
            .transport(transport.clone())
            .chat_ids(["x"])
            .queue_capacity(2);
        let client = Arc::new(TelegramClient::start(config).unwrap());

        let producer = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                for i in 0..6 {
                    client.send(&i.to_string()).await.unwrap();
                }
            })
        };

        producer.await.unwrap();
        // Two queued plus the one being sent
        assert!(client.pending() <= 3);
        client.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(transport.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_senders() {
        let transport = Arc::new(FakeTransport::default());
        let client = Arc::new(start_with(transport.clone()));

        let mut tasks = Vec::new();
        for t in 0..4 {
            let client = Arc::clone(&client);
            tasks.push(tokio::spawn(async move {
                for i in 0..10 {
                    client.send_to(&format!("{t}-{i}"), ["c"]).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        client.stop(Duration::from_secs(5)).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 40);
        // Each producer's messages keep their relative order
        for t in 0..4 {
            let prefix = format!("{t}-");
            let own: Vec<String> = calls
                .iter()
                .filter(|(_, text)| text.starts_with(&prefix))
                .map(|(_, text)| text.clone())
                .collect();
            let expected: Vec<String> = (0..10).map(|i| format!("{t}-{i}")).collect();
            assert_eq!(own, expected);
        }
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        // Fails before anything is spawned, so no runtime is needed
        let result = TelegramClient::start(ClientConfig::new(""));
        assert!(matches!(result, Err(TelegramError::Config(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/bottest-token/sendMessage")
            .match_body(Matcher::Json(json!({"chat_id": "42", "text": "hello there"})))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .expect(1)
            .create_async()
            .await;
        let rejected = server
            .mock("POST", "/bottest-token/sendMessage")
            .match_body(Matcher::PartialJson(json!({"chat_id": "404"})))
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let config = ClientConfig::new("test-token")
            .api_url(server.url())
            .chat_ids(["42"]);
        let client = TelegramClient::start(config).unwrap();
        let mut errors = client.errors().unwrap();

        client.send("hello there").await.unwrap();
        client.send_to("anyone?", ["404"]).await.unwrap();
        client.stop(Duration::from_secs(5)).await.unwrap();

        ok.assert_async().await;
        rejected.assert_async().await;

        let err = errors.recv().await.unwrap();
        assert_eq!(err.chat_id, "404");
        assert!(err.to_string().contains("chat not found"));
    }
}
