use deadpool::managed::PoolError;

/// Why a channel to the work queue could not be handed out.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to connect to RabbitMq.")]
    Connect(#[source] anyhow::Error),
    #[error("Failed to open a channel on the RabbitMq connection.")]
    OpenChannel(#[source] lapin::Error),
    #[error("The `{queue}` queue could not be declared or does not exist.")]
    Queue {
        queue: String,
        #[source]
        source: lapin::Error,
    },
    #[error("No RabbitMq connection available: {0}")]
    Exhausted(String),
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            PoolError::Backend(e) => e,
            err => Self::Exhausted(err.to_string()),
        }
    }
}
