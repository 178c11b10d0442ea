//! Background send worker
//!
//! Drains the send queue one message at a time and reports failed
//! deliveries on a single-slot error channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::DeliveryError;
use crate::split::preview;
use crate::transport::Transport;

/// One chunk of a message addressed to one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outbound {
    pub chat_id: String,
    pub text: String,
}

pub(crate) struct Worker {
    token: String,
    transport: Arc<dyn Transport>,
    receiver: mpsc::Receiver<Outbound>,
    errors: mpsc::Sender<DeliveryError>,
    shutdown: oneshot::Receiver<()>,
    pending: Arc<AtomicUsize>,
    delivered: usize,
    failed: usize,
}

impl Worker {
    pub fn new(
        token: String,
        transport: Arc<dyn Transport>,
        receiver: mpsc::Receiver<Outbound>,
        errors: mpsc::Sender<DeliveryError>,
        shutdown: oneshot::Receiver<()>,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            token,
            transport,
            receiver,
            errors,
            shutdown,
            pending,
            delivered: 0,
            failed: 0,
        }
    }

    /// Run until the queue is closed and empty
    pub async fn run(mut self) {
        tracing::info!("Telegram send worker started");

        let mut closing = false;
        loop {
            tokio::select! {
                biased;

                // A dropped client counts as a shutdown request too
                _ = &mut self.shutdown, if !closing => {
                    self.receiver.close();
                    closing = true;
                    tracing::debug!(
                        "Send queue closed, draining {} pending messages",
                        self.receiver.len()
                    );
                }

                unit = self.receiver.recv() => {
                    match unit {
                        Some(unit) => {
                            self.deliver(unit).await;
                            self.pending.fetch_sub(1, Ordering::SeqCst);
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(
            delivered = self.delivered,
            failed = self.failed,
            "Telegram send worker stopped"
        );
    }

    async fn deliver(&mut self, unit: Outbound) {
        match self
            .transport
            .send_message(&self.token, &unit.chat_id, &unit.text)
            .await
        {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                self.failed += 1;
                tracing::error!(
                    chat_id = %unit.chat_id,
                    text = preview(&unit.text),
                    "Failed to send Telegram message: {}",
                    e
                );
                self.report(DeliveryError {
                    chat_id: unit.chat_id,
                    source: e,
                });
            }
        }
    }

    /// Never waits: the slot holds at most one unread error
    fn report(&self, err: DeliveryError) {
        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                tracing::debug!("Error stream full, dropping: {}", err);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
