//! NMEA 0183 sentence decoding
//!
//! Framing (start delimiter, checksum, sentence kind) is checked here; GGA
//! (fix data) and RMC (recommended minimum) fields are decoded by the `nmea`
//! crate. Everything else that is well-formed comes back as
//! [`Sentence::Other`].

use ::nmea::sentences::{rmc::RmcStatusOfFix, FixType};
use ::nmea::ParseResult;
use thiserror::Error;

/// Errors that can occur while decoding a sentence
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NmeaError {
    #[error("sentence does not start with '$': {0:?}")]
    MissingStart(String),
    #[error("malformed checksum field {0:?}")]
    InvalidChecksum(String),
    #[error("checksum mismatch: expected {expected:02X}, computed {computed:02X}")]
    ChecksumMismatch { expected: u8, computed: u8 },
    #[error("malformed {sentence} sentence: {reason}")]
    Parse { sentence: &'static str, reason: String },
}

/// Global Positioning System fix data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgaData {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub fix_quality: Option<u8>,
    pub satellite_count: Option<u32>,
    pub hdop: Option<f64>,
    /// Altitude above mean sea level (meters)
    pub altitude: Option<f64>,
}

/// Recommended minimum navigation data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmcData {
    /// 'A' active or 'V' void
    pub status: Option<char>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
    /// Course over ground, degrees true
    pub course: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Gga(GgaData),
    Rmc(RmcData),
    /// A valid sentence of a type the pipeline ignores, e.g. "GSV"
    Other(String),
}

/// XOR of every byte in `body` (the text between '$' and '*')
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Wrap `body` into a complete sentence with checksum and CRLF terminator
pub fn encode_sentence(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, checksum(body))
}

/// Decode one sentence
///
/// Surrounding whitespace is ignored. The checksum is verified when present.
pub fn parse_sentence(line: &str) -> Result<Sentence, NmeaError> {
    let line = line.trim();
    let body = line
        .strip_prefix('$')
        .ok_or_else(|| NmeaError::MissingStart(line.to_string()))?;

    let body = match body.split_once('*') {
        Some((body, checksum_field)) => {
            let expected = u8::from_str_radix(checksum_field, 16)
                .map_err(|_| NmeaError::InvalidChecksum(checksum_field.to_string()))?;
            let computed = checksum(body);
            if expected != computed {
                return Err(NmeaError::ChecksumMismatch { expected, computed });
            }
            body
        }
        None => body,
    };

    let address = body.split(',').next().unwrap_or_default();

    // Talker ID is two characters (GP, GN, GL, ...); proprietary sentences start with 'P'
    let kind = match address.get(2..) {
        Some(kind) if address.len() == 5 && !address.starts_with('P') => kind,
        _ => address,
    };

    match kind {
        "GGA" => match decode("GGA", body)? {
            ParseResult::GGA(gga) => Ok(Sentence::Gga(GgaData {
                latitude: gga.latitude,
                longitude: gga.longitude,
                fix_quality: gga.fix_type.map(fix_quality),
                satellite_count: gga.fix_satellites,
                hdop: gga.hdop.map(widen),
                altitude: gga.altitude.map(widen),
            })),
            _ => Ok(Sentence::Other(kind.to_string())),
        },
        "RMC" => match decode("RMC", body)? {
            ParseResult::RMC(rmc) => Ok(Sentence::Rmc(RmcData {
                status: Some(match rmc.status_of_fix {
                    RmcStatusOfFix::Invalid => 'V',
                    RmcStatusOfFix::Autonomous | RmcStatusOfFix::Differential => 'A',
                }),
                latitude: rmc.lat,
                longitude: rmc.lon,
                speed_knots: rmc.speed_over_ground.map(widen),
                course: rmc.true_course.map(widen),
            })),
            _ => Ok(Sentence::Other(kind.to_string())),
        },
        other => Ok(Sentence::Other(other.to_string())),
    }
}

/// Hand a verified body to the field decoder, which always wants a checksum
fn decode(sentence: &'static str, body: &str) -> Result<ParseResult, NmeaError> {
    let framed = format!("${}*{:02X}", body, checksum(body));
    ::nmea::parse_str(&framed).map_err(|error| NmeaError::Parse {
        sentence,
        reason: format!("{:?}", error),
    })
}

/// GGA quality indicator digit
fn fix_quality(fix_type: FixType) -> u8 {
    match fix_type {
        FixType::Invalid => 0,
        FixType::Gps => 1,
        FixType::DGps => 2,
        FixType::Pps => 3,
        FixType::Rtk => 4,
        FixType::FloatRtk => 5,
        FixType::Estimated => 6,
        FixType::Manual => 7,
        FixType::Simulation => 8,
    }
}

/// Widen through the shortest decimal form so "545.4" stays 545.4
fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(f64::from(value))
}
