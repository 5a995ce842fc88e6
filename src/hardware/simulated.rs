//! Simulated GPS receiver producing a slow diagonal drift
//!
//! Sentence generation is a pure function of scaled elapsed time and the
//! wall-clock instant used for the UTC fields, so it can be tested without
//! sleeping. The transport itself paces output at one GGA+RMC pair per
//! `1 / speed` seconds.

use crate::hardware::GpsTransport;
use crate::processing::nmea::encode_sentence;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const START_LATITUDE: f64 = 32.7157;
pub const START_LONGITUDE: f64 = -117.1611;
pub const START_ALTITUDE: f64 = 20.0;

/// Degrees of latitude/longitude gained per simulated second
const DEGREES_PER_SECOND: f64 = 0.0001;
/// Meters of altitude gained per simulated second
const METERS_PER_SECOND: f64 = 0.01;

/// Simulated position after `elapsed` simulated seconds
pub fn simulated_position(elapsed: f64) -> (f64, f64, f64) {
    (
        START_LATITUDE + DEGREES_PER_SECOND * elapsed,
        START_LONGITUDE + DEGREES_PER_SECOND * elapsed,
        START_ALTITUDE + METERS_PER_SECOND * elapsed,
    )
}

/// GGA and RMC sentences for the simulated position at `elapsed`
pub fn simulated_sentences(elapsed: f64, utc: DateTime<Utc>) -> String {
    let (lat, lon, alt) = simulated_position(elapsed);
    let time = utc.format("%H%M%S");
    let date = utc.format("%d%m%y");
    let (lat_field, ns) = format_coordinate(lat, 2, 'N', 'S');
    let (lon_field, ew) = format_coordinate(lon, 3, 'E', 'W');

    let gga = format!(
        "GPGGA,{},{},{},{},{},1,08,0.9,{:.1},M,0.0,M,,",
        time, lat_field, ns, lon_field, ew, alt
    );
    let rmc = format!(
        "GPRMC,{},A,{},{},{},{},0.5,054.7,{},003.1,W",
        time, lat_field, ns, lon_field, ew, date
    );

    let mut out = encode_sentence(&gga);
    out.push_str(&encode_sentence(&rmc));
    out
}

/// Signed decimal degrees to `d..dmm.mmmm` plus hemisphere
fn format_coordinate(value: f64, degree_digits: usize, positive: char, negative: char) -> (String, char) {
    let hemisphere = if value < 0.0 { negative } else { positive };
    // work in ten-thousandths of a minute so rounding never yields 60.0000
    let units = (value.abs() * 60.0 * 10_000.0).round() as u64;
    let degrees = units / 600_000;
    let minutes = (units % 600_000) as f64 / 10_000.0;
    (
        format!("{:0width$}{:07.4}", degrees, minutes, width = degree_digits),
        hemisphere,
    )
}

pub struct SimulatedGpsTransport {
    speed: f64,
    started: Instant,
    next_emit: Instant,
    pending: VecDeque<u8>,
}

impl SimulatedGpsTransport {
    /// `speed` scales simulated time against real time
    pub fn new(speed: f64) -> Self {
        let now = Instant::now();
        Self {
            speed,
            started: now,
            next_emit: now,
            pending: VecDeque::new(),
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.speed)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        if self.next_emit > now {
            std::thread::sleep(self.next_emit - now);
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.started).as_secs_f64() * self.speed;
        self.pending.extend(simulated_sentences(elapsed, Utc::now()).bytes());
        self.next_emit = (self.next_emit + self.period()).max(now);
    }
}

impl GpsTransport for SimulatedGpsTransport {
    fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            self.refill();
        }
        let n = max_len.min(self.pending.len());
        Some(self.pending.drain(..n).collect())
    }

    fn describe(&self) -> String {
        format!("simulated x{}", self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::nmea::{parse_sentence, Sentence};
    use chrono::TimeZone;

    fn utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 35, 19).unwrap()
    }

    fn parse_all(text: &str) -> Vec<Sentence> {
        text.split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_sentence(line).unwrap())
            .collect()
    }

    #[test]
    fn test_initial_sentences() {
        let text = simulated_sentences(0.0, utc());
        assert!(text.starts_with("$GPGGA,123519,3242.9420,N,11709.6660,W,1,08,0.9,20.0,M"));
        assert!(text.contains("$GPRMC,123519,A,3242.9420,N,11709.6660,W,0.5,054.7,150124,003.1,W*"));
        assert!(text.ends_with("\r\n"));

        let sentences = parse_all(&text);
        assert_eq!(sentences.len(), 2);
        let Sentence::Gga(gga) = &sentences[0] else { panic!("expected GGA") };
        assert_eq!(gga.altitude, Some(20.0));
        assert_eq!(gga.satellite_count, Some(8));
        let Sentence::Rmc(rmc) = &sentences[1] else { panic!("expected RMC") };
        assert!((rmc.latitude.unwrap() - START_LATITUDE).abs() < 1e-6);
        assert!((rmc.longitude.unwrap() - START_LONGITUDE).abs() < 1e-6);
        assert_eq!(rmc.course, Some(54.7));
    }

    #[test]
    fn test_drift_is_deterministic() {
        let a = simulated_sentences(100.0, utc());
        let b = simulated_sentences(100.0, utc());
        assert_eq!(a, b);

        let sentences = parse_all(&a);
        let Sentence::Rmc(rmc) = &sentences[1] else { panic!("expected RMC") };
        assert!((rmc.latitude.unwrap() - 32.7257).abs() < 1e-6);
        assert!((rmc.longitude.unwrap() + 117.1511).abs() < 1e-6);
        let Sentence::Gga(gga) = &sentences[0] else { panic!("expected GGA") };
        assert_eq!(gga.altitude, Some(21.0));
    }

    #[test]
    fn test_coordinate_rounding() {
        assert_eq!(format_coordinate(32.999_999_99, 2, 'N', 'S'), ("3300.0000".to_string(), 'N'));
        assert_eq!(format_coordinate(-0.5, 3, 'E', 'W'), ("00030.0000".to_string(), 'W'));
    }

    #[test]
    fn test_read_respects_max_len() {
        let mut transport = SimulatedGpsTransport::new(1000.0);
        let first = transport.read(32).unwrap();
        assert_eq!(first.len(), 32);
        assert!(first.starts_with(b"$GPGGA,"));

        let mut collected = first;
        while collected.iter().filter(|&&b| b == b'\n').count() < 2 && collected.len() < 400 {
            let chunk = transport.read(8).unwrap();
            assert!(chunk.len() <= 8);
            collected.extend(chunk);
        }
        let text = String::from_utf8(collected).unwrap();
        assert!(text.contains("$GPRMC,"));
    }
}
