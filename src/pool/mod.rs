//! Pooled channels to the work queue, built on [`deadpool`].
//!
//! Broken channels and connections are discarded when they are handed back to the pool,
//! so a consumer that lost the broker gets a fresh channel on its next fetch.
//!
//! ```rust
//! use stock_worker::{amqp::configuration::RabbitMqSettings, pool, queue::RabbitMqQueueSettings};
//!
//! fn build_pool() -> anyhow::Result<pool::ChannelPool> {
//!     pool::channel_pool(&RabbitMqSettings::default(), &RabbitMqQueueSettings::default())
//! }
//! ```
use crate::{
    amqp::{configuration::RabbitMqSettings, ConnectionFactory},
    queue::RabbitMqQueueSettings,
};

mod channel;
mod connection;
mod error;

pub use channel::{ChannelManager, ChannelPool};
pub use connection::ConnectionPool;
pub use error::Error;

/// The worker polls from a single channel at a time: one connection is enough, a second
/// channel covers the replacement of a broken one.
const MAX_CONNECTIONS: usize = 1;
const MAX_CHANNELS: usize = 2;

/// Build the channel pool used by [`RabbitMqQueue`](crate::queue::RabbitMqQueue).
///
/// No connection is opened until the first channel is requested.
pub fn channel_pool(
    rabbit_mq: &RabbitMqSettings,
    queue: &RabbitMqQueueSettings,
) -> Result<ChannelPool, anyhow::Error> {
    let connection_pool = ConnectionPool::builder(ConnectionFactory::new_from_config(rabbit_mq)?)
        .max_size(MAX_CONNECTIONS)
        .build()?;
    Ok(ChannelPool::builder(ChannelManager::new(connection_pool, queue))
        .max_size(MAX_CHANNELS)
        .build()?)
}
