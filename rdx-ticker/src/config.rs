//! Defines the configuration for the ticker service.
//!
//! The struct is designed to be deserialized with `serde` from a TOML file
//! layered under `TICKER_*` environment variables, so the driver's pacing can
//! be tuned without touching application code. Every field has a default, so
//! an empty file (or no file at all) yields `TickerConfig::default()`.

use crate::common::{usecs_to_duration, Usecs};
use crate::error::TickerError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Longest the driver sleeps when no timer is more urgent, in microseconds.
pub const DEFAULT_IDLE_INTERVAL_USECS: Usecs = 0x8000;

/// Default number of undelivered events each timer's source will hold.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// The top-level configuration for a `TickerService`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Upper bound on a single driver sleep, in microseconds.
    pub idle_interval_usecs: Usecs,

    /// Per-timer event buffer. A tick that finds this many events still
    /// queued for some subscriber is dropped.
    pub event_capacity: usize,

    /// Maximum ticks a timer may fire in one driver cycle. `None` catches up
    /// on the whole debt, however large.
    pub max_catch_up: Option<u32>,

    /// Name given to the driver thread.
    pub thread_name: String,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            idle_interval_usecs: DEFAULT_IDLE_INTERVAL_USECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_catch_up: None,
            thread_name: "ticker-driver".to_string(),
        }
    }
}

impl TickerConfig {
    /// Loads the configuration from an optional TOML file, then applies any
    /// `TICKER_*` environment overrides (e.g. `TICKER_EVENT_CAPACITY=64`).
    pub fn load(path: Option<&Path>) -> Result<Self, TickerError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("TICKER").try_parsing(true))
            .build()?;
        let config: TickerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, TickerError> {
        let config: TickerConfig = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TickerError> {
        if self.idle_interval_usecs <= 0 {
            return Err(TickerError::InvalidConfig(format!(
                "idle_interval_usecs must be positive, got {}",
                self.idle_interval_usecs
            )));
        }
        if self.event_capacity == 0 {
            return Err(TickerError::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_catch_up == Some(0) {
            return Err(TickerError::InvalidConfig(
                "max_catch_up must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_interval(&self) -> Duration {
        usecs_to_duration(self.idle_interval_usecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = TickerConfig::from_toml("").unwrap();
        assert_eq!(TickerConfig::default(), config);
        assert_eq!(Duration::from_micros(32768), config.idle_interval());
    }

    #[test]
    fn toml_overrides_fields() {
        let config = TickerConfig::from_toml(
            r#"
            idle_interval_usecs = 10000
            event_capacity = 8
            max_catch_up = 16
            thread_name = "frame-pacer"
            "#,
        )
        .unwrap();

        assert_eq!(10_000, config.idle_interval_usecs);
        assert_eq!(8, config.event_capacity);
        assert_eq!(Some(16), config.max_catch_up);
        assert_eq!("frame-pacer", config.thread_name);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = TickerConfig::from_toml("event_capacity = 0").unwrap_err();
        assert!(matches!(err, TickerError::InvalidConfig(_)));
    }

    #[test]
    fn non_positive_idle_interval_is_rejected() {
        let err = TickerConfig::from_toml("idle_interval_usecs = -1").unwrap_err();
        assert!(matches!(err, TickerError::InvalidConfig(_)));
    }

    #[test]
    fn zero_catch_up_cap_is_rejected() {
        let config = TickerConfig {
            max_catch_up: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = TickerConfig::load(Some(Path::new("/nonexistent/ticker.toml"))).unwrap_err();
        assert!(matches!(err, TickerError::Config(_)));
    }
}
