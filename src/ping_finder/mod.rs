//! Ping detection and the lifecycle coordinator around it

pub mod engine;
pub mod estimator;
pub mod generator;
pub mod module;
pub mod online;

pub use engine::{DefaultEngineFactory, DetectionEngine, EngineError, EngineFactory, EngineSettings, PingCallback, SdrType};
pub use estimator::{
    CentroidEstimatorFactory, EstimatorError, EstimatorFactory, LocationCallback, LocationEstimator,
    WeightedCentroidEstimator,
};
pub use generator::GeneratorEngine;
pub use module::{Collaborators, MonitorSettings, PingFinderError, PingFinderModule};
pub use online::{OnlinePingFinderManager, OnlineSettings, PendingAction};
