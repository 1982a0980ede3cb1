use super::{connection::ConnectionPool, Error};
use crate::queue::RabbitMqQueueSettings;
use amq_protocol_types::FieldTable;
use deadpool::managed::{self, Manager};
use lapin::{options::QueueDeclareOptions, Channel, ChannelState};

/// Channels ready to poll the work queue.
pub type ChannelPool = deadpool::managed::Pool<ChannelManager>;

/// Opens channels on pooled connections and makes sure the work queue is there.
///
/// Every new channel declares the queue: durably if `declare` is set in the settings,
/// passively (i.e. only checking that it exists) otherwise. A missing queue then surfaces
/// as a failed fetch, and the consumer retries after its cooldown.
pub struct ChannelManager {
    connection_pool: ConnectionPool,
    queue_name: String,
    declare: bool,
}

impl ChannelManager {
    pub fn new(connection_pool: ConnectionPool, queue: &RabbitMqQueueSettings) -> Self {
        Self {
            connection_pool,
            queue_name: queue.name.clone(),
            declare: queue.declare,
        }
    }
}

fn declare_options(declare: bool) -> QueueDeclareOptions {
    QueueDeclareOptions {
        passive: !declare,
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = Error;

    async fn create(&self) -> Result<Channel, Error> {
        let connection = self.connection_pool.get().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(Error::OpenChannel)?;
        channel
            .queue_declare(
                &self.queue_name,
                declare_options(self.declare),
                FieldTable::default(),
            )
            .await
            .map_err(|source| Error::Queue {
                queue: self.queue_name.clone(),
                source,
            })?;
        Ok(channel)
    }

    async fn recycle(&self, channel: &mut Channel) -> managed::RecycleResult<Error> {
        match channel.status().state() {
            ChannelState::Connected => Ok(()),
            state => {
                tracing::warn!(?state, "Dropping a broken RabbitMq channel.");
                Err(managed::RecycleError::Message(format!(
                    "RabbitMq channel in state {state:?}"
                )))
            }
        }
    }
}
