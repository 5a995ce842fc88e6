//! Thresholds, bounds and timings shared across the flight-data subsystem

use std::ops::RangeInclusive;
use std::time::Duration;

/// Maximum number of fixes retained in the GPS history
pub const GPS_HISTORY_CAPACITY: usize = 1000;

/// Bytes requested from the GPS transport per read
pub const GPS_READ_CHUNK_SIZE: usize = 32;

/// Consecutive failed reads before the GPS subsystem enters `Error`
pub const GPS_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Silence while `Running` after which the GPS drops back to `Initializing`
pub const GPS_DATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff after a failed or empty read
pub const GPS_RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;
pub const ALTITUDE_RANGE: RangeInclusive<f64> = -1000.0..=100_000.0;
pub const HEADING_RANGE: RangeInclusive<f64> = 0.0..=360.0;
pub const SATELLITE_COUNT_RANGE: RangeInclusive<u32> = 0..=32;
pub const FIX_QUALITY_RANGE: RangeInclusive<u8> = 0..=6;

/// HDOP must lie strictly between 0 and this bound to be physically plausible
pub const HDOP_UPPER_BOUND: f64 = 100.0;

/// Minimum satellites for a fix to be trusted
pub const MIN_SATELLITES: u32 = 4;

/// HDOP at or above this value is rejected
pub const MAX_HDOP: f64 = 5.0;

/// Largest plausible horizontal jump between consecutive valid fixes (meters)
pub const MAX_POSITION_JUMP_M: f64 = 1000.0;

/// Largest plausible vertical rate between consecutive valid fixes (m/s)
pub const MAX_ALTITUDE_RATE_MPS: f64 = 100.0;

/// Mean Earth radius used by the haversine distance (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Cancellation poll period of the ping-finder monitoring loop
pub const PING_FINDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the monitoring loop during `stop()`
pub const PING_FINDER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const GPS_TELEMETRY_INTERVAL: Duration = Duration::from_secs(1);
