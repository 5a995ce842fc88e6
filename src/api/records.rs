//! Rows persisted for every detected ping and location estimate

use crate::core::{format_timestamp, GpsFix};
use serde::{Deserialize, Serialize};

pub const PING_LOG_HEADER: [&str; 9] = [
    "Run",
    "Timestamp",
    "Frequency",
    "Amplitude",
    "Easting",
    "Northing",
    "Altitude",
    "Heading",
    "EPSG Code",
];

pub const ESTIMATION_LOG_HEADER: [&str; 6] = ["Run", "Timestamp", "Frequency", "Easting", "Northing", "EPSG Code"];

/// A detected ping tagged with the GPS fix closest to its detection time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRecord {
    #[serde(rename = "Run")]
    pub run: u32,
    /// RFC 3339 capture time of the resolved fix
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Frequency")]
    pub frequency: u32,
    #[serde(rename = "Amplitude")]
    pub amplitude: f64,
    #[serde(rename = "Easting")]
    pub easting: Option<f64>,
    #[serde(rename = "Northing")]
    pub northing: Option<f64>,
    #[serde(rename = "Altitude")]
    pub altitude: Option<f64>,
    #[serde(rename = "Heading")]
    pub heading: Option<f64>,
    #[serde(rename = "EPSG Code")]
    pub epsg_code: Option<u32>,
}

impl PingRecord {
    pub fn new(run: u32, fix: &GpsFix, frequency: u32, amplitude: f64) -> Self {
        Self {
            run,
            timestamp: format_timestamp(fix.timestamp),
            frequency,
            amplitude,
            easting: fix.easting(),
            northing: fix.northing(),
            altitude: fix.altitude,
            heading: fix.heading,
            epsg_code: fix.epsg_code(),
        }
    }
}

/// Location estimate for one frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationRecord {
    #[serde(rename = "Run")]
    pub run: u32,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Frequency")]
    pub frequency: u32,
    #[serde(rename = "Easting")]
    pub easting: f64,
    #[serde(rename = "Northing")]
    pub northing: f64,
    #[serde(rename = "EPSG Code")]
    pub epsg_code: Option<u32>,
}

impl EstimationRecord {
    pub fn new(run: u32, fix: &GpsFix, frequency: u32, estimate: (f64, f64)) -> Self {
        Self {
            run,
            timestamp: format_timestamp(fix.timestamp),
            frequency,
            easting: estimate.0,
            northing: estimate.1,
            epsg_code: fix.epsg_code(),
        }
    }
}

/// Best estimate per frequency at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalEstimate {
    pub frequency: u32,
    pub easting: f64,
    pub northing: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Projection;

    #[test]
    fn test_ping_record_from_fix() {
        let mut fix = GpsFix::at(1_700_000_000.5).with_position(32.7157, -117.1611).with_altitude(20.0);
        fix.apply_projection(&Projection::from_epsg(32611).unwrap()).unwrap();

        let record = PingRecord::new(3, &fix, 173_043_000, 12.5);
        assert_eq!(record.run, 3);
        assert_eq!(record.timestamp, "2023-11-14T22:13:20.500+00:00");
        assert_eq!(record.epsg_code, Some(32611));
        assert_eq!(record.easting, fix.easting());
        assert_eq!(record.heading, None);
    }

    #[test]
    fn test_estimation_record_without_projection() {
        let fix = GpsFix::at(0.0);
        let record = EstimationRecord::new(1, &fix, 150_000, (1.0, 2.0));
        assert_eq!(record.timestamp, "1970-01-01T00:00:00+00:00");
        assert_eq!(record.epsg_code, None);
        assert_eq!((record.easting, record.northing), (1.0, 2.0));
    }
}
