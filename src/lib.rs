//! `stock-worker` applies the asynchronous events of the stock game to its user store.
//!
//! Events travel through a work queue as JSON [`Envelope`](crate::consumers::Envelope)s.
//! A [`Consumer`](crate::consumers::Consumer) pulls them in batches, routes each one to the
//! handler registered for its `action` and acknowledges it once it has been applied.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stock_worker::{
//!     consumers::Consumer,
//!     queue::InMemoryQueue,
//!     users::{InMemoryUserStore, RegisterUser, REGISTER_USER},
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let consumer = Consumer::builder(
//!     Arc::new(InMemoryQueue::default()),
//!     Arc::new(InMemoryUserStore::new()),
//! )
//! .handler(REGISTER_USER, RegisterUser)
//! .build()?;
//! consumer.run_until_stopped().await
//! # }
//! ```

pub mod amqp;
pub mod configuration;
pub mod consumers;
pub mod pool;
pub mod queue;
pub mod telemetry;
pub mod users;
