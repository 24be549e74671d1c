//! Error types returned by the ticker service.

use thiserror::Error;

/// Errors raised while configuring the service or bringing up its driver.
///
/// Precondition violations such as a zero timer period are not represented
/// here; they are caller bugs and panic instead.
#[derive(Debug, Error)]
pub enum TickerError {
    #[error("failed to spawn the timer driver thread")]
    DriverSpawn(#[source] std::io::Error),

    #[error("failed to load ticker configuration")]
    Config(#[from] config::ConfigError),

    #[error("invalid ticker configuration: {0}")]
    InvalidConfig(String),
}
