//! Detection engine abstraction
//!
//! The coordinator drives an SDR-backed ping detector through
//! [`DetectionEngine`]. Engines are built by an [`EngineFactory`] so the
//! hardware driver can be swapped for the signal generator in tests and
//! bench runs.

use crate::ping_finder::GeneratorEngine;
use crate::utils::config::PingFinderConfig;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Invoked as `(timestamp, amplitude, frequency)` for every detected ping,
/// on a thread owned by the engine
pub type PingCallback = Arc<dyn Fn(f64, f64, u32) + Send + Sync>;

/// Errors raised by detection engines
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid SDR type '{0}', valid options: USRP, AIRSPY, HACKRF, GENERATOR")]
    InvalidSdrType(String),
    #[error("no driver linked for SDR type {0}")]
    Unsupported(SdrType),
    #[error("engine started before being configured")]
    NotConfigured,
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("engine runtime failure: {0}")]
    Runtime(String),
}

/// Supported software-defined radio front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdrType {
    Usrp,
    Airspy,
    Hackrf,
    Generator,
}

impl SdrType {
    pub const ALL: [SdrType; 4] = [SdrType::Usrp, SdrType::Airspy, SdrType::Hackrf, SdrType::Generator];

    pub fn name(&self) -> &'static str {
        match self {
            SdrType::Usrp => "USRP",
            SdrType::Airspy => "AIRSPY",
            SdrType::Hackrf => "HACKRF",
            SdrType::Generator => "GENERATOR",
        }
    }
}

impl FromStr for SdrType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        SdrType::ALL
            .into_iter()
            .find(|sdr| sdr.name() == upper)
            .ok_or(EngineError::InvalidSdrType(upper))
    }
}

impl fmt::Display for SdrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values copied onto an engine at configure time
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub sdr_type: SdrType,
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

impl EngineSettings {
    pub fn new(sdr_type: SdrType, config: &PingFinderConfig) -> Self {
        Self {
            sdr_type,
            gain: config.gain,
            sampling_rate: config.sampling_rate,
            center_frequency: config.center_frequency,
            run_num: config.run_num,
            enable_test_data: config.enable_test_data,
            ping_width_ms: config.ping_width_ms,
            ping_min_snr: config.ping_min_snr,
            ping_max_len_mult: config.ping_max_len_mult,
            ping_min_len_mult: config.ping_min_len_mult,
            target_frequencies: config.target_frequencies.clone(),
        }
    }
}

/// Ping detector driven by the coordinator
///
/// `configure` and `register_callback` are called once, before the engine is
/// shared. `start`, `stop` and `check_health` may be called from different
/// threads.
pub trait DetectionEngine: Send + Sync {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), EngineError>;

    fn register_callback(&mut self, callback: PingCallback);

    fn start(&self) -> Result<(), EngineError>;

    fn stop(&self) -> Result<(), EngineError>;

    /// Report a fault that ended detection; polled by the monitoring loop
    fn check_health(&self) -> Result<(), EngineError>;
}

/// Builds an engine for a given front end
pub trait EngineFactory: Send + Sync {
    fn create(&self, sdr_type: SdrType) -> Result<Box<dyn DetectionEngine>, EngineError>;
}

/// Factory for the engines linked into this build
///
/// Only the signal generator is available; hardware front ends report
/// [`EngineError::Unsupported`].
#[derive(Debug, Clone)]
pub struct DefaultEngineFactory {
    pub ping_interval: Duration,
}

impl Default for DefaultEngineFactory {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(1),
        }
    }
}

impl EngineFactory for DefaultEngineFactory {
    fn create(&self, sdr_type: SdrType) -> Result<Box<dyn DetectionEngine>, EngineError> {
        match sdr_type {
            SdrType::Generator => Ok(Box::new(GeneratorEngine::new(self.ping_interval))),
            other => Err(EngineError::Unsupported(other)),
        }
    }
}
