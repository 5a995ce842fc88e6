//! Rejection reasons produced by the GPS data gate

use thiserror::Error;

/// Why a parsed fix was refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A populated field lies outside its physical bounds
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("too few satellites: {count} (need at least {required})")]
    TooFewSatellites { count: u32, required: u32 },

    #[error("HDOP too high: {hdop} (limit {limit})")]
    HdopTooHigh { hdop: f64, limit: f64 },

    /// Receiver reports fix quality 0
    #[error("receiver reports no fix")]
    NoFix,

    #[error("position jump of {distance_m:.1} m exceeds {limit_m} m")]
    PositionJump { distance_m: f64, limit_m: f64 },

    #[error("altitude rate of {rate_mps:.1} m/s exceeds {limit_mps} m/s")]
    AltitudeRate { rate_mps: f64, limit_mps: f64 },
}

impl ValidationError {
    /// Short category used in log output
    pub fn category(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { .. } => "range",
            ValidationError::TooFewSatellites { .. }
            | ValidationError::HdopTooHigh { .. }
            | ValidationError::NoFix => "quality",
            ValidationError::PositionJump { .. } | ValidationError::AltitudeRate { .. } => {
                "continuity"
            }
        }
    }
}
