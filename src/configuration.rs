//! Layered configuration for the worker binary.
use crate::{
    amqp::configuration::RabbitMqSettings, consumers::ConsumerSettings,
    queue::RabbitMqQueueSettings, users::DatabaseSettings,
};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rabbit_mq: RabbitMqSettings,
    pub queue: RabbitMqQueueSettings,
    #[serde(default)]
    pub consumer: ConsumerSettings,
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load the settings from the `configuration` folder under `base_path`.
    ///
    /// Sources, from lowest to highest priority:
    /// - `configuration/base.yml`;
    /// - `configuration/{environment}.yml`, if it exists. `environment` falls back to the
    ///   `APP_ENVIRONMENT` env variable, then to `local`;
    /// - env variables prefixed with `APP` and using `__` as separator, e.g.
    ///   `APP_CONSUMER__BATCH_SIZE=5` sets `consumer.batch_size`.
    pub fn load(base_path: &Path, environment: Option<String>) -> Result<Self, ConfigError> {
        let environment = environment
            .unwrap_or_else(|| std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "local".into()));

        Config::builder()
            .add_source(File::from(base_path.join("configuration/base.yml")))
            .add_source(
                File::from(base_path.join(format!("configuration/{}.yml", environment)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
