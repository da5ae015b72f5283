use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection failed: {0}")]
    Connection(String),
    #[error("queue operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// A queue holding upload-completed notifications. A message stays owned by
/// the consumer until it is acknowledged, released or rejected.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Waits up to `wait` for a single message.
    async fn receive(&self, wait: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// Removes the message for good.
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Returns the message to the queue for redelivery.
    async fn release(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Hands the message to the queue's dead-letter route without redelivery.
    async fn reject(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
