use super::{DeleteError, FetchError, QueueClient, RawMessage};
use crate::pool::ChannelPool;
use amq_protocol_types::DeliveryTag;
use anyhow::Context;
use futures_util::Future;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicGetOptions, BasicNackOptions},
};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::{fmt, time::Duration};
use tokio::time::Instant;

const DEFAULT_REDELIVERY_DELAY_SECONDS: u64 = 30;

#[derive(Debug, Deserialize, Clone)]
/// Where and how to poll the RabbitMq queue.
pub struct RabbitMqQueueSettings {
    /// The name of the queue holding the events.
    pub name: String,
    /// How long a `receive` call keeps polling an empty queue before returning no messages.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub wait_time_seconds: u64,
    /// Pause between two polls of an empty queue, in milliseconds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_millis: u64,
    /// Declare the queue as durable on every new channel. If unset, the queue must exist.
    #[serde(default)]
    pub declare: bool,
    /// How long a message that failed processing stays in flight before it is requeued.
    /// Only applies when the queue is wrapped in a [`DelayedRelease`](super::DelayedRelease).
    #[serde(
        default = "default_redelivery_delay_seconds",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub redelivery_delay_seconds: u64,
}

fn default_redelivery_delay_seconds() -> u64 {
    DEFAULT_REDELIVERY_DELAY_SECONDS
}

impl RabbitMqQueueSettings {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_secs(self.redelivery_delay_seconds)
    }
}

impl Default for RabbitMqQueueSettings {
    fn default() -> Self {
        Self {
            name: "stock-worker".into(),
            wait_time_seconds: 20,
            poll_interval_millis: 500,
            declare: false,
            redelivery_delay_seconds: DEFAULT_REDELIVERY_DELAY_SECONDS,
        }
    }
}

/// A [`QueueClient`] backed by a RabbitMq queue.
///
/// RabbitMq pushes messages to consumers; to get the pull-based, batched semantics the
/// consumer expects we fetch messages one by one with `basic.get` (manual acknowledgement)
/// and emulate long polling when the queue is empty.
///
/// Channels come from a [`ChannelPool`]: if the broker goes away, the broken channel is
/// discarded and the next `receive` (after the consumer cooldown) opens a new one.
pub struct RabbitMqQueue {
    channel_pool: ChannelPool,
    queue_name: String,
    wait_time: Duration,
    poll_interval: Duration,
}

/// Receipt for a delivery fetched from RabbitMq.
///
/// Acknowledgements are scoped to the channel the message was fetched on: the acker keeps
/// a handle to that channel.
pub struct AmqpReceipt {
    delivery_tag: DeliveryTag,
    acker: Acker,
}

impl fmt::Debug for AmqpReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpReceipt")
            .field("delivery_tag", &self.delivery_tag)
            .finish_non_exhaustive()
    }
}

impl RabbitMqQueue {
    pub fn new(channel_pool: ChannelPool, settings: &RabbitMqQueueSettings) -> Self {
        Self {
            channel_pool,
            queue_name: settings.name.clone(),
            wait_time: Duration::from_secs(settings.wait_time_seconds),
            poll_interval: Duration::from_millis(settings.poll_interval_millis),
        }
    }

    async fn get_batch(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<AmqpReceipt>>, anyhow::Error> {
        let channel = self
            .channel_pool
            .get()
            .await
            .context("Failed to get a channel to RabbitMq.")?;
        let channel = &*channel;
        let queue_name = self.queue_name.as_str();

        fill_batch(max_messages, move || async move {
            let message = channel
                .basic_get(queue_name, BasicGetOptions { no_ack: false })
                .await
                .with_context(|| format!("Failed to get a message from `{}`.", queue_name))?;
            Ok(message.map(|message| {
                let delivery = message.delivery;
                RawMessage {
                    body: delivery.data,
                    receipt: AmqpReceipt {
                        delivery_tag: delivery.delivery_tag,
                        acker: delivery.acker,
                    },
                }
            }))
        })
        .await
    }
}

/// Pull messages with `next` until `max_messages` are collected or the queue is empty.
///
/// A failure after the first message ends the batch early instead of failing it: the
/// messages already fetched are unacked deliveries and must reach the consumer to be
/// acknowledged (or released).
async fn fill_batch<T, F, Fut>(max_messages: usize, mut next: F) -> Result<Vec<T>, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let mut batch = Vec::with_capacity(max_messages);
    while batch.len() < max_messages {
        match next().await {
            Ok(Some(message)) => batch.push(message),
            Ok(None) => break,
            Err(e) if batch.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error.message = %e,
                    error.details = ?e,
                    fetched = batch.len(),
                    "Fetching failed part way through a batch, processing what was fetched."
                );
                break;
            }
        }
    }
    Ok(batch)
}

#[async_trait::async_trait]
impl QueueClient for RabbitMqQueue {
    type Receipt = AmqpReceipt;

    #[tracing::instrument(name = "rabbitmq_receive", skip(self), fields(queue_name = %self.queue_name))]
    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<AmqpReceipt>>, FetchError> {
        let deadline = Instant::now() + self.wait_time;
        loop {
            let batch = self.get_batch(max_messages).await?;
            if !batch.is_empty() || max_messages == 0 || Instant::now() >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep_until(deadline.min(Instant::now() + self.poll_interval)).await;
        }
    }

    async fn delete(&self, receipt: AmqpReceipt) -> Result<(), DeleteError> {
        receipt
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| DeleteError::Backend(e.into()))?;
        Ok(())
    }

    /// Nack the delivery, asking the broker to put it back at the head of the queue.
    ///
    /// The next `receive` gets it again straight away: wrap the queue in a
    /// [`DelayedRelease`](super::DelayedRelease) to space out redeliveries.
    async fn release(&self, receipt: AmqpReceipt) -> Result<(), DeleteError> {
        let nack_options = BasicNackOptions {
            multiple: false,
            requeue: true,
        };
        receipt
            .acker
            .nack(nack_options)
            .await
            .map_err(|e| DeleteError::Backend(e.into()))?;
        Ok(())
    }
}
