//! Flight-data subsystem of a radio-telemetry tracking drone
//!
//! Acquires and validates GPS fixes, keeps a timestamped position history,
//! tracks the GPS and ping-finder state machines and correlates detected
//! signal pings with where the drone was when each ping arrived.

pub mod core;
pub mod state;
pub mod processing;
pub mod validation;
pub mod hardware;
pub mod gps;
pub mod ping_finder;
pub mod comms;
pub mod api;
pub mod utils;

// Re-export commonly used types
pub use core::{GpsEvent, GpsFix, GpsState, PingFinderEvent, PingFinderState};
pub use state::StateManager;
pub use processing::{Projection, ProjectionError};
pub use validation::{DataValidator, ValidationConfig, ValidationError};
pub use hardware::{CommError, CommResult, GpsInterfaceConfig, GpsTransport};
pub use gps::{GpsModule, GpsModuleHandle, GpsModuleSettings};
pub use ping_finder::{
    Collaborators, OnlinePingFinderManager, OnlineSettings, PingFinderError, PingFinderModule, SdrType,
};
pub use comms::{RadioEventHandler, RadioLink};
pub use api::{FinalEstimate, RecordSink};
pub use utils::{ConfigError, HardwareConfig, PingFinderConfig};
