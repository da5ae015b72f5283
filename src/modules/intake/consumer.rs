use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::events::{output_prefix_for, parse_notification};
use super::queue::{JobQueue, QueueMessage};
use crate::modules::dispatch::Dispatch;

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Bucket the notifications are expected from
    pub transient_bucket: String,
    pub output_prefix_root: String,
    /// Upper bound of one long poll
    pub poll_wait: Duration,
    /// Pause between polling rounds
    pub poll_interval: Duration,
}

/// What one polling round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing arrived within the wait.
    Idle,
    /// Every record was dispatched and the message removed.
    Acknowledged { dispatched: usize },
    /// The body was still not a notification on redelivery; handed to the
    /// dead-letter route.
    Rejected,
    /// A dispatch failed, or a malformed body arrived for the first time;
    /// the message goes back for redelivery.
    Released,
    /// The queue itself failed.
    QueueFailed,
}

/// Polls the upload queue and launches one worker per uploaded object.
pub struct JobConsumer<Q, D> {
    queue: Q,
    dispatcher: D,
    settings: ConsumerSettings,
}

impl<Q: JobQueue, D: Dispatch> JobConsumer<Q, D> {
    pub fn new(queue: Q, dispatcher: D, settings: ConsumerSettings) -> Self {
        Self {
            queue,
            dispatcher,
            settings,
        }
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            bucket = %self.settings.transient_bucket,
            "🎥 Job consumer started"
        );

        while !shutdown.is_cancelled() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.poll_once() => {
                    if outcome != PollOutcome::Idle {
                        info!(?outcome, "Polling round finished");
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Job consumer stopped");
    }

    /// One Polling → Parsing → Dispatching → Acknowledging round.
    pub async fn poll_once(&self) -> PollOutcome {
        let message = match self.queue.receive(self.settings.poll_wait).await {
            Ok(Some(message)) => message,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                error!("❌ Error polling queue: {}", e);
                return PollOutcome::QueueFailed;
            }
        };

        let objects = match parse_notification(&message.body) {
            Ok(objects) => objects,
            Err(e) if message.redelivered => {
                error!(tag = message.delivery_tag, "❌ Not a valid storage event, dead-lettering: {}", e);
                return self.settle_rejected(&message).await;
            }
            Err(e) => {
                // left on the queue; a second delivery that still fails goes to the dead-letter route
                warn!(tag = message.delivery_tag, "❌ Not a valid storage event: {}", e);
                return self.settle_released(&message).await;
            }
        };

        let mut seen = HashSet::new();
        let mut dispatched = 0;
        for object in objects {
            if object.bucket != self.settings.transient_bucket {
                warn!(
                    bucket = %object.bucket,
                    key = %object.key,
                    "Skipping upload from unexpected bucket"
                );
                continue;
            }
            if !seen.insert(object.key.clone()) {
                continue;
            }

            info!("📦 New video uploaded: s3://{}/{}", object.bucket, object.key);
            let output_prefix = output_prefix_for(&self.settings.output_prefix_root, &object.key);

            if let Err(e) = self.dispatcher.dispatch(&object.key, &output_prefix).await {
                error!(key = %object.key, "❌ Dispatch failed: {}", e);
                return self.settle_released(&message).await;
            }
            dispatched += 1;
        }

        match self.queue.acknowledge(&message).await {
            Ok(()) => {
                info!(dispatched, "🗑️ Job removed from queue");
                PollOutcome::Acknowledged { dispatched }
            }
            Err(e) => {
                error!("❌ Error deleting message from queue: {}", e);
                PollOutcome::QueueFailed
            }
        }
    }

    async fn settle_rejected(&self, message: &QueueMessage) -> PollOutcome {
        match self.queue.reject(message).await {
            Ok(()) => PollOutcome::Rejected,
            Err(e) => {
                error!("❌ Failed to reject message: {}", e);
                PollOutcome::QueueFailed
            }
        }
    }

    async fn settle_released(&self, message: &QueueMessage) -> PollOutcome {
        match self.queue.release(message).await {
            Ok(()) => PollOutcome::Released,
            Err(e) => {
                error!("❌ Failed to release message: {}", e);
                PollOutcome::QueueFailed
            }
        }
    }
}
