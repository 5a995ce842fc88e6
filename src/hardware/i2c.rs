//! I2C (DDC) GPS receiver through the Linux i2c-dev interface

use crate::hardware::{CommError, CommResult, GpsTransport};
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use std::io;
use tracing::{info, warn};

/// Register that streams pending NMEA bytes on u-blox style receivers
const DATA_STREAM_REGISTER: u8 = 0xFF;

/// GPS receiver on `/dev/i2c-{bus}` at a 7-bit slave address
///
/// Receivers pad the stream with 0xFF when no data is pending; the
/// acquisition pipeline drops those bytes when decoding.
pub struct I2cGpsTransport {
    device_path: String,
    address: u8,
    device: LinuxI2CDevice,
}

fn to_io(error: LinuxI2CError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, error.to_string())
}

impl I2cGpsTransport {
    pub fn open(bus: u8, address: u8) -> CommResult<Self> {
        if address > 0x7F {
            return Err(CommError::configuration("i2c_address", format!("0x{:02X}", address)));
        }

        let device_path = format!("/dev/i2c-{}", bus);
        let device = LinuxI2CDevice::new(&device_path, u16::from(address)).map_err(|error| CommError::Open {
            device: device_path.clone(),
            source: to_io(error),
        })?;

        info!(device = %device_path, address = %format!("0x{:02X}", address), "Opened I2C GPS");
        Ok(Self {
            device_path,
            address,
            device,
        })
    }

    fn read_block(&mut self, max_len: usize) -> Result<Vec<u8>, LinuxI2CError> {
        self.device.write(&[DATA_STREAM_REGISTER])?;
        let mut buf = vec![0u8; max_len];
        self.device.read(&mut buf)?;
        Ok(buf)
    }
}

impl GpsTransport for I2cGpsTransport {
    fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        match self.read_block(max_len) {
            Ok(data) => Some(data),
            Err(error) => {
                let error = CommError::Io {
                    device: self.device_path.clone(),
                    source: to_io(error),
                };
                warn!(%error, "I2C GPS read failed");
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("i2c {} @ 0x{:02X}", self.device_path, self.address)
    }
}
