//! Hardware abstraction layer for GPS receivers
//!
//! Every receiver interface implements [`GpsTransport`], a plain byte source.
//! Framing, parsing and retry policy live in the acquisition pipeline.

pub mod transport;
pub mod serial;
pub mod i2c;
pub mod simulated;
pub mod mock;
pub mod error;

pub use transport::{GpsTransport, GpsInterfaceConfig};
pub use serial::SerialGpsTransport;
pub use i2c::I2cGpsTransport;
pub use simulated::SimulatedGpsTransport;
pub use mock::MockGpsTransport;
pub use error::{CommError, CommResult};
