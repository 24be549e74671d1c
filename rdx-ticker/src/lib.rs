//! # Ticker
//!
//! A background-thread periodic timer service for Rust.
//!
//! Ticker drives any number of countdown timers from one dedicated thread and
//! publishes a timestamped event for every tick. It is meant for
//! application-level pacing (frame timing, countdown logic), not for hard
//! real-time work.
//!
//! ## Core Concepts
//!
//! - **TickerService**: Owns the registry of timers and the driver thread.
//!   The thread exists only while at least one timer is started.
//! - **Timer**: An owned handle with a configurable period. Started timers
//!   tick once per period; a driver that oversleeps fires the missed ticks in
//!   a burst on its next wake-up.
//! - **Event-Driven**: Each timer is an event source. Subscribers receive a
//!   `TimerEvent` carrying the tick count and the time of the tick.
//! - **Configuration-Driven**: Driver pacing, event buffering and catch-up
//!   limits come from a `TickerConfig`, often loaded from a TOML file.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ticker::prelude::*;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     // 1. Create the service.
//!     let service = TickerService::new(TickerConfig::default())?;
//!
//!     // 2. Create a timer and subscribe before starting it.
//!     let timer = service.create_timer(Duration::from_millis(16));
//!     let mut ticks = timer.subscribe();
//!
//!     // 3. Start it. The first started timer brings up the driver thread.
//!     timer.start()?;
//!
//!     // 4. Consume ticks.
//!     for _ in 0..60 {
//!         let event = ticks.blocking_recv()?;
//!         println!("tick #{} at {:?}", event.count, event.timestamp);
//!     }
//!
//!     // 5. Dropping the handle stops and releases the timer.
//!     timer.destroy();
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Ticker";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod config;
mod driver;
pub mod engine;
pub mod error;
pub mod events;
mod registry;
pub mod time;
pub mod timer;

/// A prelude module for easy importing of the most common Ticker types.
pub mod prelude {
    pub use crate::common::TimerId;
    pub use crate::config::TickerConfig;
    pub use crate::engine::TickerService;
    pub use crate::error::TickerError;
    pub use crate::events::{Subscription, SystemEvent, TimerEvent};
    pub use crate::timer::Timer;
}
