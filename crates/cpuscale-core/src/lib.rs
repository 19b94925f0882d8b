//! cpuscale-core: shared building blocks for the cpuscale autoscaler.
//!
//! - [`config`]: the daemon settings table, its defaults and validation.
//! - [`types`]: JSON shapes exchanged with the control endpoint.
//! - [`cancel`]: the broadcast stop signal threaded through loops and
//!   network calls.

pub mod cancel;
pub mod config;
pub mod types;

pub use cancel::{cancel_pair, CancelSignal, CancelTrigger};
pub use config::{ConfigError, LogLevel, Settings};
pub use types::*;
