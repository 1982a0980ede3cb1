use super::Error;
use crate::amqp::ConnectionFactory;
use deadpool::managed::{self, Manager};
use lapin::{Connection, ConnectionState};

/// The broker connections backing the [`ChannelPool`](super::ChannelPool).
pub type ConnectionPool = deadpool::managed::Pool<ConnectionFactory>;

#[async_trait::async_trait]
impl Manager for ConnectionFactory {
    type Type = Connection;
    type Error = Error;

    async fn create(&self) -> Result<Connection, Error> {
        let connection = self.new_connection().await.map_err(Error::Connect)?;
        tracing::info!("Connected to RabbitMq.");
        Ok(connection)
    }

    async fn recycle(&self, connection: &mut Connection) -> managed::RecycleResult<Error> {
        match connection.status().state() {
            ConnectionState::Connected => Ok(()),
            state => {
                tracing::warn!(?state, "Dropping a broken RabbitMq connection.");
                Err(managed::RecycleError::Message(format!(
                    "RabbitMq connection in state {state:?}"
                )))
            }
        }
    }
}
