//! Core data types for the flight-data subsystem

use crate::core::constants::{
    ALTITUDE_RANGE, FIX_QUALITY_RANGE, HDOP_UPPER_BOUND, HEADING_RANGE, LATITUDE_RANGE,
    LONGITUDE_RANGE, MAX_HDOP, MIN_SATELLITES, SATELLITE_COUNT_RANGE,
};
use crate::processing::projection::{Projection, ProjectionError};
use crate::validation::ValidationError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Render a Unix timestamp as RFC 3339 UTC
pub fn format_timestamp(timestamp: f64) -> String {
    DateTime::<Utc>::from_timestamp_micros((timestamp * 1e6).round() as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

/// A single GPS reading with quality metadata and capture time
///
/// Projected coordinates are derived through [`GpsFix::apply_projection`] and
/// are either all present or all absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub timestamp: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    easting: Option<f64>,
    northing: Option<f64>,
    epsg_code: Option<u32>,
    pub satellite_count: Option<u32>,
    pub hdop: Option<f64>,
    pub fix_quality: Option<u8>,
    pub is_valid: bool,
}

impl GpsFix {
    /// Create an empty fix stamped with the current time
    pub fn new() -> Self {
        Self::at(unix_timestamp())
    }

    /// Create an empty fix with an explicit capture time
    pub fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            latitude: None,
            longitude: None,
            altitude: None,
            heading: None,
            easting: None,
            northing: None,
            epsg_code: None,
            satellite_count: None,
            hdop: None,
            fix_quality: None,
            is_valid: false,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn easting(&self) -> Option<f64> {
        self.easting
    }

    pub fn northing(&self) -> Option<f64> {
        self.northing
    }

    pub fn epsg_code(&self) -> Option<u32> {
        self.epsg_code
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Project latitude/longitude into `projection`
    ///
    /// Returns `Ok(false)` and leaves the projected fields untouched when the
    /// fix carries no geographic position.
    pub fn apply_projection(&mut self, projection: &Projection) -> Result<bool, ProjectionError> {
        let (Some(lat), Some(lon)) = (self.latitude, self.longitude) else {
            return Ok(false);
        };
        let (easting, northing) = projection.project(lat, lon)?;
        self.easting = Some(easting);
        self.northing = Some(northing);
        self.epsg_code = Some(projection.epsg_code());
        Ok(true)
    }

    /// Check every populated field against its physical bounds
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("latitude", self.latitude, &LATITUDE_RANGE)?;
        check_range("longitude", self.longitude, &LONGITUDE_RANGE)?;
        check_range("altitude", self.altitude, &ALTITUDE_RANGE)?;
        check_range("heading", self.heading, &HEADING_RANGE)?;

        if let Some(hdop) = self.hdop {
            if !(hdop > 0.0 && hdop < HDOP_UPPER_BOUND) {
                return Err(ValidationError::OutOfRange { field: "hdop", value: hdop });
            }
        }
        if let Some(count) = self.satellite_count {
            if !SATELLITE_COUNT_RANGE.contains(&count) {
                return Err(ValidationError::OutOfRange {
                    field: "satellite_count",
                    value: f64::from(count),
                });
            }
        }
        if let Some(quality) = self.fix_quality {
            if !FIX_QUALITY_RANGE.contains(&quality) {
                return Err(ValidationError::OutOfRange {
                    field: "fix_quality",
                    value: f64::from(quality),
                });
            }
        }
        Ok(())
    }

    /// Check the receiver-reported quality metrics against trust thresholds
    pub fn check_quality(&self) -> Result<(), ValidationError> {
        if let Some(count) = self.satellite_count {
            if count < MIN_SATELLITES {
                return Err(ValidationError::TooFewSatellites { count, required: MIN_SATELLITES });
            }
        }
        if let Some(hdop) = self.hdop {
            if hdop >= MAX_HDOP {
                return Err(ValidationError::HdopTooHigh { hdop, limit: MAX_HDOP });
            }
        }
        if self.fix_quality == Some(0) {
            return Err(ValidationError::NoFix);
        }
        Ok(())
    }
}

impl Default for GpsFix {
    fn default() -> Self {
        Self::new()
    }
}

fn check_range(
    field: &'static str,
    value: Option<f64>,
    range: &std::ops::RangeInclusive<f64>,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ValidationError::OutOfRange { field, value: v }),
        _ => Ok(()),
    }
}

/// Operational state of the GPS acquisition subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum GpsState {
    #[default]
    Uncreated,
    Idle,
    Initializing,
    Running,
    Error,
}

/// Things that happen to the GPS subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsEvent {
    Created,
    AcquisitionStarted,
    /// A validated fix carrying latitude and longitude was stored
    FixAcquired,
    /// No data within the data timeout
    SignalLost,
    ErrorThresholdReached,
    Stopped,
}

impl GpsState {
    /// Pure transition function
    ///
    /// `Error` is only left through `Stopped` or a fresh `AcquisitionStarted`.
    pub fn on(self, event: GpsEvent) -> GpsState {
        use GpsEvent::*;
        use GpsState::*;
        match (self, event) {
            (_, Created) | (_, Stopped) => Idle,
            (_, AcquisitionStarted) => Initializing,
            (_, ErrorThresholdReached) => Error,
            (Initializing, FixAcquired) => Running,
            (Running, SignalLost) => Initializing,
            (state, FixAcquired) | (state, SignalLost) => state,
        }
    }
}

impl fmt::Display for GpsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpsState::Uncreated => "Uncreated",
            GpsState::Idle => "Idle",
            GpsState::Initializing => "Initializing",
            GpsState::Running => "Running",
            GpsState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Operational state of the ping-finder subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PingFinderState {
    #[default]
    Uncreated,
    Idle,
    Initializing,
    Running,
    Error,
}

/// Things that happen to the ping-finder subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingFinderEvent {
    /// An engine was created and configured
    Configured,
    StartRequested,
    EngineStarted,
    /// The engine failed to start or faulted while running
    EngineFailed,
    /// The monitoring loop exited on cancellation
    MonitorExited,
    Stopped,
    /// The engine handle was discarded
    Released,
}

impl PingFinderState {
    /// Pure transition function
    pub fn on(self, event: PingFinderEvent) -> PingFinderState {
        use PingFinderEvent::*;
        use PingFinderState::*;
        match (self, event) {
            (_, Configured) | (_, Stopped) => Idle,
            (_, Released) => Uncreated,
            (_, EngineFailed) => Error,
            (Idle, StartRequested) => Initializing,
            (Initializing, EngineStarted) => Running,
            (Error, MonitorExited) => Error,
            (_, MonitorExited) => Idle,
            (state, StartRequested) | (state, EngineStarted) => state,
        }
    }
}

impl fmt::Display for PingFinderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PingFinderState::Uncreated => "Uncreated",
            PingFinderState::Idle => "Idle",
            PingFinderState::Initializing => "Initializing",
            PingFinderState::Running => "Running",
            PingFinderState::Error => "Error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> GpsFix {
        GpsFix::at(100.0).with_position(32.7, -117.2).with_altitude(50.0)
    }

    #[test]
    fn test_range_validation() {
        assert!(fix().validate().is_ok());

        let mut bad = fix();
        bad.latitude = Some(95.0);
        assert_eq!(
            bad.validate(),
            Err(ValidationError::OutOfRange { field: "latitude", value: 95.0 })
        );

        let mut bad = fix();
        bad.hdop = Some(0.0);
        assert!(bad.validate().is_err());

        let mut bad = fix();
        bad.fix_quality = Some(7);
        assert!(bad.validate().is_err());

        let mut bad = fix();
        bad.heading = Some(360.5);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_quality_validation() {
        let mut f = fix();
        f.satellite_count = Some(2);
        assert!(f.validate().is_ok());
        assert!(matches!(
            f.check_quality(),
            Err(ValidationError::TooFewSatellites { count: 2, .. })
        ));

        let mut f = fix();
        f.hdop = Some(5.0);
        assert!(matches!(f.check_quality(), Err(ValidationError::HdopTooHigh { .. })));

        let mut f = fix();
        f.fix_quality = Some(0);
        assert_eq!(f.check_quality(), Err(ValidationError::NoFix));

        let mut f = fix();
        f.satellite_count = Some(8);
        f.hdop = Some(0.9);
        f.fix_quality = Some(1);
        assert!(f.check_quality().is_ok());
    }

    #[test]
    fn test_projection_requires_position() {
        let projection = Projection::from_epsg(32611).unwrap();

        let mut empty = GpsFix::at(1.0).with_altitude(10.0);
        assert!(!empty.apply_projection(&projection).unwrap());
        assert_eq!(empty.easting(), None);
        assert_eq!(empty.epsg_code(), None);

        let mut located = fix();
        assert!(located.apply_projection(&projection).unwrap());
        assert!(located.easting().is_some());
        assert!(located.northing().is_some());
        assert_eq!(located.epsg_code(), Some(32611));
    }

    #[test]
    fn test_gps_transitions() {
        use GpsEvent::*;
        assert_eq!(GpsState::Uncreated.on(Created), GpsState::Idle);
        assert_eq!(GpsState::Idle.on(AcquisitionStarted), GpsState::Initializing);
        assert_eq!(GpsState::Initializing.on(FixAcquired), GpsState::Running);
        assert_eq!(GpsState::Running.on(FixAcquired), GpsState::Running);
        assert_eq!(GpsState::Running.on(SignalLost), GpsState::Initializing);
        assert_eq!(GpsState::Initializing.on(SignalLost), GpsState::Initializing);
        assert_eq!(GpsState::Running.on(ErrorThresholdReached), GpsState::Error);
        // no automatic recovery out of Error
        assert_eq!(GpsState::Error.on(FixAcquired), GpsState::Error);
        assert_eq!(GpsState::Error.on(Stopped), GpsState::Idle);
    }

    #[test]
    fn test_ping_finder_transitions() {
        use PingFinderEvent::*;
        assert_eq!(PingFinderState::Uncreated.on(Configured), PingFinderState::Idle);
        assert_eq!(PingFinderState::Idle.on(StartRequested), PingFinderState::Initializing);
        assert_eq!(PingFinderState::Running.on(StartRequested), PingFinderState::Running);
        assert_eq!(PingFinderState::Initializing.on(EngineStarted), PingFinderState::Running);
        assert_eq!(PingFinderState::Running.on(MonitorExited), PingFinderState::Idle);
        assert_eq!(PingFinderState::Error.on(MonitorExited), PingFinderState::Error);
        assert_eq!(PingFinderState::Idle.on(Released), PingFinderState::Uncreated);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "1970-01-01T00:00:00+00:00");
    }
}
