//! Transmitter location estimation
//!
//! The coordinator only talks to [`LocationEstimator`]. The weighted centroid
//! below is a reference implementation: each ping contributes the vehicle
//! position at detection time, weighted by amplitude.

use nalgebra::Vector2;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimatorError {
    #[error("no GPS position available near {timestamp}")]
    LocationUnavailable { timestamp: f64 },
}

/// Vehicle `(easting, northing, altitude)` at a timestamp, or now when `None`
pub type LocationCallback = Arc<dyn Fn(Option<f64>) -> Result<(f64, f64, f64), EstimatorError> + Send + Sync>;

pub trait LocationEstimator: Send {
    fn add_ping(&mut self, timestamp: f64, amplitude: f64, frequency: u32);

    /// Current `(easting, northing)` estimate, `None` while data is insufficient
    fn do_estimate(&mut self, frequency: u32) -> Option<(f64, f64)>;

    /// Every frequency that has been fed a ping, ascending
    fn frequencies(&self) -> Vec<u32>;
}

pub trait EstimatorFactory: Send + Sync {
    fn create(&self, location: LocationCallback) -> Box<dyn LocationEstimator>;
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    position: Vector2<f64>,
    amplitude: f64,
}

pub struct WeightedCentroidEstimator {
    location: LocationCallback,
    min_pings: usize,
    samples: BTreeMap<u32, Vec<Sample>>,
}

impl WeightedCentroidEstimator {
    pub const DEFAULT_MIN_PINGS: usize = 3;

    pub fn new(location: LocationCallback) -> Self {
        Self::with_min_pings(location, Self::DEFAULT_MIN_PINGS)
    }

    pub fn with_min_pings(location: LocationCallback, min_pings: usize) -> Self {
        Self {
            location,
            min_pings: min_pings.max(1),
            samples: BTreeMap::new(),
        }
    }

    pub fn ping_count(&self, frequency: u32) -> usize {
        self.samples.get(&frequency).map_or(0, Vec::len)
    }
}

impl LocationEstimator for WeightedCentroidEstimator {
    fn add_ping(&mut self, timestamp: f64, amplitude: f64, frequency: u32) {
        match (self.location)(Some(timestamp)) {
            Ok((easting, northing, _altitude)) => {
                self.samples.entry(frequency).or_default().push(Sample {
                    position: Vector2::new(easting, northing),
                    amplitude,
                });
            }
            Err(error) => warn!(%error, frequency, "Dropping ping without vehicle location"),
        }
    }

    fn do_estimate(&mut self, frequency: u32) -> Option<(f64, f64)> {
        let samples = self.samples.get(&frequency)?;
        if samples.len() < self.min_pings {
            return None;
        }

        let total: f64 = samples.iter().map(|s| s.amplitude.max(0.0)).sum();
        let centroid = if total > 0.0 {
            samples
                .iter()
                .fold(Vector2::zeros(), |acc, s| acc + s.position * s.amplitude.max(0.0))
                / total
        } else {
            samples.iter().fold(Vector2::zeros(), |acc, s| acc + s.position) / samples.len() as f64
        };

        Some((centroid.x, centroid.y))
    }

    fn frequencies(&self) -> Vec<u32> {
        self.samples.keys().copied().collect()
    }
}

/// Builds [`WeightedCentroidEstimator`]s
#[derive(Debug, Clone)]
pub struct CentroidEstimatorFactory {
    pub min_pings: usize,
}

impl Default for CentroidEstimatorFactory {
    fn default() -> Self {
        Self {
            min_pings: WeightedCentroidEstimator::DEFAULT_MIN_PINGS,
        }
    }
}

impl EstimatorFactory for CentroidEstimatorFactory {
    fn create(&self, location: LocationCallback) -> Box<dyn LocationEstimator> {
        Box::new(WeightedCentroidEstimator::with_min_pings(location, self.min_pings))
    }
}
