//! NMEA decoding and coordinate projection

pub mod nmea;
pub mod projection;

pub use self::nmea::{parse_sentence, GgaData, NmeaError, RmcData, Sentence};
pub use projection::{Projection, ProjectionError};
