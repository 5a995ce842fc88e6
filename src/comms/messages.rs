//! Messages exchanged with the base station

use crate::core::GpsFix;
use crate::utils::config::PingFinderConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier the link assigns to every outgoing packet; acknowledgments
/// refer back to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketId(pub u32);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Answer to a control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Sync { success: bool },
    Start { success: bool },
    Stop { success: bool },
    Config { success: bool },
}

impl ControlResponse {
    pub fn success(&self) -> bool {
        match *self {
            ControlResponse::Sync { success }
            | ControlResponse::Start { success }
            | ControlResponse::Stop { success }
            | ControlResponse::Config { success } => success,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlResponse::Sync { .. } => "sync",
            ControlResponse::Start { .. } => "start",
            ControlResponse::Stop { .. } => "stop",
            ControlResponse::Config { .. } => "config",
        }
    }
}

/// Unsolicited data pushed to the base station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryMessage {
    Gps {
        easting: Option<f64>,
        northing: Option<f64>,
        altitude: Option<f64>,
        heading: Option<f64>,
        epsg_code: Option<u32>,
    },
    Ping {
        frequency: u32,
        amplitude: f64,
        easting: Option<f64>,
        northing: Option<f64>,
        altitude: Option<f64>,
        epsg_code: Option<u32>,
    },
    LocationEstimate {
        frequency: u32,
        easting: f64,
        northing: f64,
        epsg_code: Option<u32>,
    },
    /// A command could not be carried out
    Error,
}

impl TelemetryMessage {
    pub fn gps(fix: &GpsFix) -> Self {
        TelemetryMessage::Gps {
            easting: fix.easting(),
            northing: fix.northing(),
            altitude: fix.altitude,
            heading: fix.heading,
            epsg_code: fix.epsg_code(),
        }
    }

    pub fn ping(fix: &GpsFix, frequency: u32, amplitude: f64) -> Self {
        TelemetryMessage::Ping {
            frequency,
            amplitude,
            easting: fix.easting(),
            northing: fix.northing(),
            altitude: fix.altitude,
            epsg_code: fix.epsg_code(),
        }
    }

    pub fn location_estimate(fix: &GpsFix, frequency: u32, estimate: (f64, f64)) -> Self {
        TelemetryMessage::LocationEstimate {
            frequency,
            easting: estimate.0,
            northing: estimate.1,
            epsg_code: fix.epsg_code(),
        }
    }
}

/// Ping finder settings sent by the base station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub gain: f64,
    pub sampling_rate: u32,
    pub center_frequency: u32,
    pub run_num: u32,
    pub enable_test_data: bool,
    pub ping_width_ms: u32,
    pub ping_min_snr: u32,
    pub ping_max_len_mult: f64,
    pub ping_min_len_mult: f64,
    pub target_frequencies: Vec<u32>,
}

impl ConfigRequest {
    pub fn into_config(self, output_dir: PathBuf) -> PingFinderConfig {
        PingFinderConfig {
            gain: self.gain,
            sampling_rate: self.sampling_rate,
            center_frequency: self.center_frequency,
            run_num: self.run_num,
            enable_test_data: self.enable_test_data,
            ping_width_ms: self.ping_width_ms,
            ping_min_snr: self.ping_min_snr,
            ping_max_len_mult: self.ping_max_len_mult,
            ping_min_len_mult: self.ping_min_len_mult,
            target_frequencies: self.target_frequencies,
            output_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Projection;

    #[test]
    fn test_response_accessors() {
        let response = ControlResponse::Config { success: false };
        assert!(!response.success());
        assert_eq!(response.kind(), "config");
        assert!(ControlResponse::Sync { success: true }.success());
    }

    #[test]
    fn test_gps_telemetry_from_fix() {
        let mut fix = GpsFix::at(10.0).with_position(32.7157, -117.1611).with_altitude(20.0);
        fix.heading = Some(54.7);
        fix.apply_projection(&Projection::from_epsg(4326).unwrap()).unwrap();

        assert_eq!(
            TelemetryMessage::gps(&fix),
            TelemetryMessage::Gps {
                easting: Some(-117.1611),
                northing: Some(32.7157),
                altitude: Some(20.0),
                heading: Some(54.7),
                epsg_code: Some(4326),
            }
        );
    }

    #[test]
    fn test_config_request_conversion() {
        let request = ConfigRequest {
            gain: 56.0,
            sampling_rate: 2_500_000,
            center_frequency: 173_500_000,
            run_num: 4,
            enable_test_data: true,
            ping_width_ms: 25,
            ping_min_snr: 25,
            ping_max_len_mult: 1.5,
            ping_min_len_mult: 0.5,
            target_frequencies: vec![173_043_000],
        };
        let config = request.into_config(PathBuf::from("/tmp/rtt_output"));
        assert_eq!(config.run_num, 4);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/rtt_output"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_packet_id_display() {
        assert_eq!(PacketId(17).to_string(), "#17");
    }
}
