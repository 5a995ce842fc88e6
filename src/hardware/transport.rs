//! GPS transport trait and interface selection

use crate::hardware::{CommError, CommResult};
use crate::hardware::{I2cGpsTransport, SerialGpsTransport, SimulatedGpsTransport};

/// Byte source feeding the acquisition pipeline
pub trait GpsTransport: Send {
    /// Read up to `max_len` bytes
    ///
    /// Returns `None` when the read failed; the failure is logged by the
    /// transport. `Some` with an empty vector means no data was available yet.
    fn read(&mut self, max_len: usize) -> Option<Vec<u8>>;

    /// Human-readable description for logging, e.g. "serial /dev/ttyUSB0 @ 9600"
    fn describe(&self) -> String;
}

/// Which receiver interface to open
#[derive(Debug, Clone, PartialEq)]
pub enum GpsInterfaceConfig {
    I2c { bus: u8, address: u8 },
    Serial { port: String, baud_rate: u32 },
    Simulated { speed: f64 },
}

impl GpsInterfaceConfig {
    pub fn validate(&self) -> CommResult<()> {
        match self {
            GpsInterfaceConfig::I2c { address, .. } => {
                if *address > 0x7F {
                    return Err(CommError::configuration(
                        "i2c_address",
                        format!("0x{:02X} (must be <= 0x7F)", address),
                    ));
                }
            }
            GpsInterfaceConfig::Serial { port, baud_rate } => {
                if port.is_empty() {
                    return Err(CommError::configuration("serial_port", "<empty>"));
                }
                if *baud_rate == 0 {
                    return Err(CommError::configuration("baud_rate", baud_rate));
                }
            }
            GpsInterfaceConfig::Simulated { speed } => {
                if !(speed.is_finite() && *speed > 0.0) {
                    return Err(CommError::configuration("simulation_speed", speed));
                }
            }
        }
        Ok(())
    }

    /// Open the configured transport
    pub fn open(&self) -> CommResult<Box<dyn GpsTransport>> {
        self.validate()?;
        let transport: Box<dyn GpsTransport> = match self {
            GpsInterfaceConfig::I2c { bus, address } => Box::new(I2cGpsTransport::open(*bus, *address)?),
            GpsInterfaceConfig::Serial { port, baud_rate } => {
                Box::new(SerialGpsTransport::open(port, *baud_rate)?)
            }
            GpsInterfaceConfig::Simulated { speed } => Box::new(SimulatedGpsTransport::new(*speed)),
        };
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(GpsInterfaceConfig::I2c { bus: 1, address: 0x42 }.validate().is_ok());
        assert!(GpsInterfaceConfig::I2c { bus: 1, address: 0x80 }.validate().is_err());
        assert!(GpsInterfaceConfig::Serial { port: "/dev/ttyS0".into(), baud_rate: 0 }
            .validate()
            .is_err());
        assert!(GpsInterfaceConfig::Simulated { speed: 0.0 }.validate().is_err());
        assert!(GpsInterfaceConfig::Simulated { speed: f64::NAN }.validate().is_err());
    }

    #[test]
    fn test_open_simulated() {
        let transport = GpsInterfaceConfig::Simulated { speed: 2.0 }.open().unwrap();
        assert!(transport.describe().contains("simulated"));
    }

    #[test]
    fn test_open_missing_serial_port() {
        let result = GpsInterfaceConfig::Serial {
            port: "/nonexistent/tty-gps".into(),
            baud_rate: 9600,
        }
        .open();
        assert!(matches!(result, Err(CommError::Open { .. })));
    }
}
