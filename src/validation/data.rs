use crate::core::{GpsFix, EARTH_RADIUS_M, MAX_ALTITUDE_RATE_MPS, MAX_POSITION_JUMP_M};
use crate::validation::ValidationError;
use geo::algorithm::line_measures::metric_spaces::HaversineMeasure;
use geo::{Distance, Point};

/// Continuity thresholds applied between consecutive valid fixes
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum great-circle distance from the last valid position (meters)
    pub max_position_jump_m: f64,
    /// Maximum vertical rate relative to the last valid altitude (m/s)
    pub max_altitude_rate_mps: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_position_jump_m: MAX_POSITION_JUMP_M,
            max_altitude_rate_mps: MAX_ALTITUDE_RATE_MPS,
        }
    }
}

/// Baseline taken from the last accepted fix
#[derive(Debug, Clone, Default)]
struct Baseline {
    position: Option<(f64, f64)>,
    altitude: Option<f64>,
    timestamp: Option<f64>,
}

/// Safety gate for parsed GPS fixes
///
/// Runs range, quality and continuity checks in that order. A fix that passes
/// becomes the baseline for the next continuity check.
pub struct DataValidator {
    config: ValidationConfig,
    baseline: Baseline,
}

impl DataValidator {
    /// Create a new data validator with default configuration
    pub fn new() -> Self {
        Self::with_config(ValidationConfig::default())
    }

    /// Create a validator with custom configuration
    pub fn with_config(config: ValidationConfig) -> Self {
        Self {
            config,
            baseline: Baseline::default(),
        }
    }

    /// Validate `fix` and, on success, adopt it as the new baseline
    pub fn validate(&mut self, fix: &GpsFix) -> Result<(), ValidationError> {
        self.check(fix)?;
        self.accept(fix);
        Ok(())
    }

    /// Run every check without touching the baseline
    pub fn check(&self, fix: &GpsFix) -> Result<(), ValidationError> {
        fix.validate()?;
        fix.check_quality()?;
        self.check_continuity(fix)
    }

    /// Adopt `fix` as the baseline for later continuity checks
    pub fn accept(&mut self, fix: &GpsFix) {
        if let (Some(lat), Some(lon)) = (fix.latitude, fix.longitude) {
            self.baseline.position = Some((lat, lon));
        }
        if let Some(alt) = fix.altitude {
            self.baseline.altitude = Some(alt);
        }
        self.baseline.timestamp = Some(fix.timestamp);
    }

    fn check_continuity(&self, fix: &GpsFix) -> Result<(), ValidationError> {
        if let (Some((last_lat, last_lon)), Some(lat), Some(lon)) =
            (self.baseline.position, fix.latitude, fix.longitude)
        {
            let distance = haversine_distance(last_lat, last_lon, lat, lon);
            if distance > self.config.max_position_jump_m {
                return Err(ValidationError::PositionJump {
                    distance_m: distance,
                    limit_m: self.config.max_position_jump_m,
                });
            }
        }

        if let (Some(last_alt), Some(alt)) = (self.baseline.altitude, fix.altitude) {
            let elapsed = self
                .baseline
                .timestamp
                .map(|last| fix.timestamp - last)
                .unwrap_or(1.0);
            let change = (alt - last_alt).abs();
            let rate = if elapsed > 0.0 {
                change / elapsed
            } else if change == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            if rate > self.config.max_altitude_rate_mps {
                return Err(ValidationError::AltitudeRate {
                    rate_mps: rate,
                    limit_mps: self.config.max_altitude_rate_mps,
                });
            }
        }

        Ok(())
    }

    /// Forget the baseline, e.g. after the receiver was restarted
    pub fn reset(&mut self) {
        self.baseline = Baseline::default();
    }
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Great-circle distance between two WGS84 points (meters)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_M).distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(timestamp: f64, lat: f64, lon: f64, alt: f64) -> GpsFix {
        let mut fix = GpsFix::at(timestamp).with_position(lat, lon).with_altitude(alt);
        fix.satellite_count = Some(8);
        fix.hdop = Some(0.9);
        fix.fix_quality = Some(1);
        fix
    }

    #[test]
    fn test_haversine_distance() {
        assert_eq!(haversine_distance(32.7, -117.2, 32.7, -117.2), 0.0);
        // one degree of latitude is ~111.2 km on the mean sphere
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "{}", d);
    }

    #[test]
    fn test_haversine_uses_configured_radius() {
        // a quarter meridian; geo's default radius would add ~14 m
        let d = haversine_distance(0.0, 10.0, 90.0, 10.0);
        assert!((d - std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_M).abs() < 1e-3, "{}", d);
    }

    #[test]
    fn test_first_fix_accepted() {
        let mut validator = DataValidator::new();
        assert!(validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).is_ok());
    }

    #[test]
    fn test_position_jump_rejected() {
        let mut validator = DataValidator::new();
        validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).unwrap();

        // ~50 km north within one second
        let result = validator.validate(&fix(101.0, 33.15, -117.2, 50.0));
        match result {
            Err(ValidationError::PositionJump { distance_m, .. }) => assert!(distance_m > 49_000.0),
            other => panic!("expected PositionJump, got {:?}", other),
        }

        // the rejected fix did not move the baseline
        assert!(validator.validate(&fix(102.0, 32.7005, -117.2, 50.0)).is_ok());
    }

    #[test]
    fn test_altitude_rate_rejected() {
        let mut validator = DataValidator::new();
        validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).unwrap();

        assert!(matches!(
            validator.validate(&fix(101.0, 32.7, -117.2, 300.0)),
            Err(ValidationError::AltitudeRate { .. })
        ));
        // same climb spread over ten seconds is fine
        assert!(validator.validate(&fix(110.0, 32.7, -117.2, 300.0)).is_ok());
    }

    #[test]
    fn test_non_positive_elapsed_time() {
        let mut validator = DataValidator::new();
        validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).unwrap();

        assert!(validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).is_ok());
        assert!(matches!(
            validator.validate(&fix(99.0, 32.7, -117.2, 51.0)),
            Err(ValidationError::AltitudeRate { .. })
        ));
    }

    #[test]
    fn test_gate_order() {
        let mut validator = DataValidator::new();

        let mut out_of_range = fix(100.0, 95.0, -117.2, 50.0);
        out_of_range.satellite_count = Some(2);
        assert_eq!(validator.validate(&out_of_range).unwrap_err().category(), "range");

        let mut poor = fix(100.0, 32.7, -117.2, 50.0);
        poor.satellite_count = Some(2);
        assert_eq!(validator.validate(&poor).unwrap_err().category(), "quality");
    }

    #[test]
    fn test_partial_fix_keeps_position_baseline() {
        let mut validator = DataValidator::new();
        validator.validate(&fix(100.0, 32.7, -117.2, 50.0)).unwrap();

        let mut altitude_only = GpsFix::at(101.0).with_altitude(52.0);
        altitude_only.satellite_count = Some(8);
        assert!(validator.validate(&altitude_only).is_ok());

        // baseline position is still the first fix
        assert!(matches!(
            validator.validate(&fix(102.0, 33.7, -117.2, 52.0)),
            Err(ValidationError::PositionJump { .. })
        ));

        validator.reset();
        assert!(validator.validate(&fix(103.0, 33.7, -117.2, 52.0)).is_ok());
    }
}
