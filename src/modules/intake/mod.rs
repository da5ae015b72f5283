pub mod consumer;
pub mod events;
pub mod queue;

pub use consumer::{ConsumerSettings, JobConsumer, PollOutcome};
pub use queue::{JobQueue, QueueError, QueueMessage};
