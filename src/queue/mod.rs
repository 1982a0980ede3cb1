//! The contract the consumer relies on to pull work from a queue backend.
//!
//! The consumer never talks to a broker directly: it asks a [`QueueClient`] for a batch of
//! [`RawMessage`]s and, once a message has been dealt with, hands its receipt back to either
//! delete it or release it for redelivery.
//!
//! Two backends are provided:
//! - [`RabbitMqQueue`], polling a RabbitMq queue with `basic.get`;
//! - [`InMemoryQueue`], a visibility-timeout queue living in the current process.
//!
//! [`DelayedRelease`] wraps a backend whose `release` makes a message visible again right
//! away, postponing redelivery of failed messages.
use std::fmt;

pub use delayed_release::DelayedRelease;
pub use in_memory::{InMemoryQueue, InMemoryReceipt};
pub use rabbit_mq::{AmqpReceipt, RabbitMqQueue, RabbitMqQueueSettings};

mod delayed_release;
mod in_memory;
mod rabbit_mq;

/// A delivery pulled from the queue, before decoding.
pub struct RawMessage<R> {
    /// The payload, as published.
    pub body: Vec<u8>,
    /// The credential required to delete (or release) this specific delivery.
    ///
    /// It is consumed by [`QueueClient::delete`] / [`QueueClient::release`]: it cannot
    /// outlive the processing of the message.
    pub receipt: R,
}

impl<R> fmt::Debug for RawMessage<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMessage")
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish_non_exhaustive()
    }
}

/// A remote work queue with at-least-once delivery.
#[async_trait::async_trait]
pub trait QueueClient: Send + Sync + 'static {
    /// Backend-specific token identifying one delivery.
    type Receipt: Send + 'static;

    /// Fetch up to `max_messages` messages.
    ///
    /// It may return fewer messages than requested, or none at all. Implementations are
    /// allowed to block for a backend-defined amount of time while waiting for messages.
    ///
    /// The consumer drops an in-flight `receive` when it is asked to shut down.
    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<Self::Receipt>>, FetchError>;

    /// Acknowledge a delivery: the message is removed from the queue for good.
    async fn delete(&self, receipt: Self::Receipt) -> Result<(), DeleteError>;

    /// Give up on a delivery without deleting it, so that the queue surfaces it again later.
    ///
    /// The default implementation drops the receipt and relies on the backend's visibility
    /// timeout to make the message available again.
    async fn release(&self, receipt: Self::Receipt) -> Result<(), DeleteError> {
        drop(receipt);
        Ok(())
    }
}

/// The queue could not be reached (or refused us) while fetching a batch.
#[derive(thiserror::Error, Debug)]
#[error("Failed to fetch messages from the queue.")]
pub struct FetchError(#[source] pub anyhow::Error);

impl From<anyhow::Error> for FetchError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

/// The queue did not accept a delete (or release) instruction for a delivery.
#[derive(thiserror::Error, Debug)]
pub enum DeleteError {
    /// The receipt does not match an in-flight delivery, e.g. it expired and the message
    /// has been handed to another consumer since.
    #[error("The receipt handle does not match any in-flight delivery.")]
    UnknownReceipt,
    #[error("The queue rejected the acknowledgement.")]
    Backend(#[source] anyhow::Error),
}
