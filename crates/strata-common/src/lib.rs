//! Common building blocks for strata: errors, the terminal-state waiter,
//! configuration and logging setup

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;
pub mod waiter;

pub use config::{LogFormat, LoggingConfig, StrataConfig, WaitConfig};
pub use error::Error;
pub use waiter::Waiter;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
