use crate::{
    consumers::{dispatcher::DispatcherBuilder, Consumer, Dispatcher, Handler},
    queue::QueueClient,
};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::{sync::Arc, time::Duration};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Tuning knobs for a [`Consumer`], as found in the configuration files.
#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerSettings {
    /// Maximum number of messages requested from the queue in a single fetch.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_size: usize,
    /// How long to wait before fetching again after a failed fetch, in seconds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub cooldown_seconds: u64,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown_seconds: DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

/// A builder for [`Consumer`]. Use [`Consumer::builder`] as entrypoint.
pub struct ConsumerBuilder<Q, C>
where
    Q: QueueClient,
    C: Send + Sync + 'static,
{
    queue: Arc<Q>,
    context: Arc<C>,
    dispatcher: DispatcherBuilder<C>,
    batch_size: usize,
    cooldown: Duration,
    exit_after: Option<usize>,
}

impl<Q, C> ConsumerBuilder<Q, C>
where
    Q: QueueClient,
    C: Send + Sync + 'static,
{
    pub(super) fn new(queue: Arc<Q>, context: Arc<C>) -> Self {
        Self {
            queue,
            context,
            dispatcher: Dispatcher::builder(),
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown: DEFAULT_COOLDOWN,
            exit_after: None,
        }
    }

    /// Apply the values from the configuration files.
    #[must_use]
    pub fn settings(self, settings: &ConsumerSettings) -> Self {
        self.batch_size(settings.batch_size)
            .cooldown(Duration::from_secs(settings.cooldown_seconds))
    }

    /// Maximum number of messages fetched in a single cycle. Defaults to 10.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Delay between a failed fetch and the next attempt. Defaults to 5 seconds.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Stop after `cycles` fetch attempts instead of running until shutdown.
    ///
    /// Mostly useful in tests and for one-off runs that drain a single batch.
    #[must_use]
    pub fn exit_after(mut self, cycles: usize) -> Self {
        self.exit_after = Some(cycles);
        self
    }

    /// Register `handler` for envelopes whose action is `action`.
    #[must_use]
    pub fn handler(mut self, action: impl Into<String>, handler: impl Handler<C>) -> Self {
        self.dispatcher = self.dispatcher.handler(action, handler);
        self
    }

    pub fn build(self) -> Result<Consumer<Q, C>, anyhow::Error> {
        if self.batch_size == 0 {
            anyhow::bail!("The batch size of a consumer must be at least 1.");
        }
        Ok(Consumer {
            queue: self.queue,
            context: self.context,
            dispatcher: self.dispatcher.build(),
            batch_size: self.batch_size,
            cooldown: self.cooldown,
            exit_after: self.exit_after,
        })
    }
}
