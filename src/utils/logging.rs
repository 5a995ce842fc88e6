//! Tracing subscriber setup and structured event helpers

use crate::core::{GpsFix, GpsState, PingFinderState};
use std::fmt::Display;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },
    #[error("failed to install global subscriber: {0}")]
    Install(String),
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `info`,
/// `rtt_drone_fds=debug`) is used.
pub fn init_logging(default_level: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| LoggingError::InvalidLevel {
            level: default_level.to_string(),
            reason: e.to_string(),
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}

/// Render an optional value, `N/A` when absent
pub fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn or_na_fixed(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.3}", v))
}

pub fn log_ping(run: u32, timestamp: &str, frequency: u32, amplitude: f64, fix: &GpsFix) {
    info!(
        run,
        timestamp,
        frequency_hz = frequency,
        amplitude = %format!("{:.2}", amplitude),
        easting = %or_na(fix.easting()),
        northing = %or_na(fix.northing()),
        altitude = %or_na(fix.altitude),
        heading = %or_na(fix.heading),
        epsg_code = %or_na(fix.epsg_code()),
        "Ping detected"
    );
}

pub fn log_estimation(run: u32, timestamp: &str, frequency: u32, estimate: (f64, f64), fix: &GpsFix) {
    info!(
        run,
        timestamp,
        frequency_hz = frequency,
        easting = %format!("{:.2}", estimate.0),
        northing = %format!("{:.2}", estimate.1),
        epsg_code = %or_na(fix.epsg_code()),
        "Location estimated"
    );
}

pub fn log_heartbeat(gps_state: GpsState, ping_finder_state: PingFinderState, fix: &GpsFix) {
    info!(
        gps_state = %gps_state,
        ping_finder_state = %ping_finder_state,
        easting = %or_na_fixed(fix.easting()),
        northing = %or_na_fixed(fix.northing()),
        altitude = %or_na(fix.altitude),
        heading = %or_na(fix.heading),
        epsg_code = %or_na(fix.epsg_code()),
        "Heartbeat"
    );
}
