use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;
pub mod service;

/// Process configuration, read from `bleibe.toml` with a `BLEIBE_`
/// environment overlay (e.g. `BLEIBE_EVENTSTORE_URL`).
#[derive(Clone, Debug, Deserialize)]
pub struct BleibeConfig {
    pub eventstore: EventStore,
    pub server: Server,
    pub logger: Logger,
}

impl BleibeConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("bleibe.toml"))
            .add_source(config::Environment::with_prefix("BLEIBE").separator("_"))
            .build()?
            .try_deserialize::<BleibeConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventStore {
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
