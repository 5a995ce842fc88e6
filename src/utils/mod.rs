//! Configuration loading and logging setup

pub mod config;
pub mod logging;

pub use config::{ConfigError, HardwareConfig, PingFinderConfig};
pub use logging::{init_logging, LoggingError};
