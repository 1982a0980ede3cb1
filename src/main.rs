use anyhow::Context;
use std::sync::Arc;
use stock_worker::{
    configuration::Settings,
    consumers::Consumer,
    pool::channel_pool,
    queue::{DelayedRelease, RabbitMqQueue},
    telemetry::init_subscriber,
    users::{PgUserStore, RegisterUser, REGISTER_USER},
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_subscriber("info")?;

    let base_path = std::env::current_dir().context("Failed to determine the current directory.")?;
    let settings = Settings::load(&base_path, None).context("Failed to load the configuration.")?;

    let channel_pool = channel_pool(&settings.rabbit_mq, &settings.queue)?;
    let queue = DelayedRelease::new(
        RabbitMqQueue::new(channel_pool, &settings.queue),
        settings.queue.redelivery_delay(),
    );

    let store = PgUserStore::connect_lazy(&settings.database)?;
    store.ensure_schema().await?;

    Consumer::builder(Arc::new(queue), Arc::new(store))
        .settings(&settings.consumer)
        .handler(REGISTER_USER, RegisterUser)
        .build()?
        .run_until_stopped()
        .await
}
